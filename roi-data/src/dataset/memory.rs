use super::*;
use crate::common::*;

/// The dataset held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    classes: IndexSet<String>,
    image_paths: Vec<PathBuf>,
    image_widths: Vec<usize>,
    records: Vec<RoiRecord>,
}

impl InMemoryDataset {
    /// Create an empty dataset. `classes` must include the background class.
    pub fn new(classes: IndexSet<String>) -> Result<Self> {
        ensure!(
            classes.get_index(0).map(String::as_str) == Some(BACKGROUND_CLASS),
            "the first class must be '{}'",
            BACKGROUND_CLASS
        );

        Ok(Self {
            classes,
            image_paths: vec![],
            image_widths: vec![],
            records: vec![],
        })
    }

    /// Add a record. `image_width` is only used to mirror boxes.
    pub fn push(
        &mut self,
        image_path: impl AsRef<Path>,
        image_width: usize,
        record: RoiRecord,
    ) -> Result<()> {
        ensure!(
            record.gt_overlaps.num_classes() == self.classes.len(),
            "the overlap matrix has {} classes, expect {}",
            record.gt_overlaps.num_classes(),
            self.classes.len()
        );

        self.image_paths.push(image_path.as_ref().to_owned());
        self.image_widths.push(image_width);
        self.records.push(record);
        Ok(())
    }
}

impl RoiDataset for InMemoryDataset {
    fn classes(&self) -> &IndexSet<String> {
        &self.classes
    }

    fn records(&self) -> &[RoiRecord] {
        &self.records
    }

    fn image_path_at(&self, index: usize) -> Option<&Path> {
        self.image_paths.get(index).map(PathBuf::as_path)
    }

    fn append_flipped_images(&mut self) -> Result<()> {
        let flipped: Vec<_> = izip!(&self.records, &self.image_widths)
            .map(|(record, &width)| record.flip_horizontal(width))
            .try_collect()?;

        self.image_paths.extend_from_within(..);
        self.image_widths.extend_from_within(..);
        self.records.extend(flipped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlaps::SparseOverlaps;

    #[test]
    fn in_memory_dataset_flip() {
        let classes = with_background_class(["cat"]).unwrap();
        let mut dataset = InMemoryDataset::new(classes).unwrap();
        let record = RoiRecord {
            boxes: vec![PixelBox::try_from_xyxy([0.0, 0.0, 9.0, 9.0]).unwrap()],
            gt_overlaps: SparseOverlaps::new(1, 2, vec![(0, 1, 1.0)]).unwrap(),
            flipped: false,
        };
        dataset.push("a.jpg", 20, record).unwrap();
        dataset.append_flipped_images().unwrap();

        assert_eq!(dataset.num_images(), 2);
        assert_eq!(dataset.image_path_at(1), Some(Path::new("a.jpg")));
        let flipped = &dataset.records()[1];
        assert!(flipped.flipped);
        assert_eq!(flipped.boxes[0].xyxy(), [10.0, 0.0, 19.0, 9.0]);
    }

    #[test]
    fn in_memory_dataset_rejects_class_mismatch() {
        let classes = with_background_class(["cat", "dog"]).unwrap();
        let mut dataset = InMemoryDataset::new(classes).unwrap();
        let record = RoiRecord {
            boxes: vec![],
            gt_overlaps: SparseOverlaps::new(0, 2, vec![]).unwrap(),
            flipped: false,
        };
        assert!(dataset.push("a.jpg", 20, record).is_err());
    }
}
