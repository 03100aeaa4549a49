use super::*;
use crate::{common::*, overlaps::SparseOverlaps};

/// The ROI dataset loaded from a CSV annotation file.
///
/// Every row describes one ROI together with the class it overlaps most
/// and the overlap value. Rows of the same image are grouped in order of
/// first appearance.
#[derive(Debug, Clone)]
pub struct CsvRoiDataset {
    pub classes: IndexSet<String>,
    pub image_paths: Vec<PathBuf>,
    pub records: Vec<RoiRecord>,
}

impl RoiDataset for CsvRoiDataset {
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
        let reader = HeaderSizeReader;
        let flipped: Vec<_> = izip!(&self.image_paths, &self.records)
            .map(|(path, record)| -> Result<_> {
                let ImageDims { width, .. } = reader.image_size(path)?;
                record
                    .flip_horizontal(width)
                    .with_context(|| format!("failed to flip boxes of '{}'", path.display()))
            })
            .try_collect()?;

        self.image_paths.extend_from_within(..);
        self.records.extend(flipped);
        Ok(())
    }
}

impl CsvRoiDataset {
    pub async fn load(
        image_dir: impl AsRef<Path>,
        label_file: impl AsRef<Path>,
        classes_file: impl AsRef<Path>,
    ) -> Result<Self> {
        let image_dir = image_dir.as_ref();
        let label_file = label_file.as_ref();
        let classes_file = classes_file.as_ref();

        // load classes file
        let classes = load_classes_file(classes_file).await?;

        // parse rows
        let samples = {
            let image_dir = image_dir.to_owned();
            let label_file = label_file.to_owned();
            tokio::task::spawn_blocking(move || load_csv_samples(image_dir, label_file)).await??
        };

        // group rows per image
        let groups: IndexMap<PathBuf, Vec<CsvRoiSample>> =
            samples
                .into_iter()
                .fold(IndexMap::new(), |mut groups, sample| {
                    groups
                        .entry(sample.image_file.clone())
                        .or_insert_with(Vec::new)
                        .push(sample);
                    groups
                });

        let (image_paths, records): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .map(|(image_file, samples)| -> Result<_> {
                let record = build_record(&classes, &samples)
                    .with_context(|| format!("invalid rows for '{}'", image_file.display()))?;
                Ok((image_file, record))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();

        Ok(Self {
            classes,
            image_paths,
            records,
        })
    }
}

/// One row of the CSV annotation file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CsvRoiSample {
    pub image_file: PathBuf,
    pub x1: R64,
    pub y1: R64,
    pub x2: R64,
    pub y2: R64,
    pub class_name: String,
    pub overlap: R64,
}

pub fn load_csv_samples(
    image_dir: impl AsRef<Path>,
    label_file: impl AsRef<Path>,
) -> Result<Vec<CsvRoiSample>> {
    let image_dir = image_dir.as_ref();
    let label_file = label_file.as_ref();

    // parse label file
    let samples: Vec<CsvRoiSample> = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(::csv::Trim::All)
        .from_path(label_file)
        .with_context(|| format!("failed to open '{}'", label_file.display()))?
        .deserialize()
        .try_collect()?;

    // check existence of image files
    let samples: Vec<_> = samples
        .into_iter()
        .map(|sample| {
            let image_file = image_dir.join(&sample.image_file);
            ensure!(
                image_file.is_file(),
                "the image file '{}' does not exist",
                image_file.display()
            );
            Ok(CsvRoiSample {
                image_file,
                ..sample
            })
        })
        .try_collect()?;

    Ok(samples)
}

/// Load foreground class names, one per line, and prepend the background class.
pub async fn load_classes_file(path: impl AsRef<Path>) -> Result<IndexSet<String>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let names: Vec<_> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    ensure!(!names.is_empty(), "no classes found in '{}'", path.display());
    with_background_class(names)
        .with_context(|| format!("invalid class list in '{}'", path.display()))
}

fn build_record(classes: &IndexSet<String>, samples: &[CsvRoiSample]) -> Result<RoiRecord> {
    let boxes: Vec<_> = samples
        .iter()
        .map(|sample| {
            PixelBox::try_from_xyxy([
                sample.x1.raw(),
                sample.y1.raw(),
                sample.x2.raw(),
                sample.y2.raw(),
            ])
        })
        .try_collect()?;

    let entries: Vec<_> = samples
        .iter()
        .enumerate()
        .filter(|(_, sample)| sample.overlap > 0.0)
        .map(|(roi, sample)| -> Result<_> {
            let class = classes
                .get_index_of(sample.class_name.as_str())
                .ok_or_else(|| format_err!("unknown class name '{}'", sample.class_name))?;
            Ok((roi, class, sample.overlap.raw()))
        })
        .try_collect()?;

    let gt_overlaps = SparseOverlaps::new(boxes.len(), classes.len(), entries)?;

    Ok(RoiRecord {
        boxes,
        gt_overlaps,
        flipped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(class_name: &str, overlap: f64) -> CsvRoiSample {
        CsvRoiSample {
            image_file: PathBuf::from("a.png"),
            x1: r64(0.0),
            y1: r64(0.0),
            x2: r64(9.0),
            y2: r64(9.0),
            class_name: class_name.to_owned(),
            overlap: r64(overlap),
        }
    }

    #[test]
    fn build_record_skips_zero_overlaps() {
        let classes = with_background_class(["cat", "dog"]).unwrap();
        let samples = vec![
            sample("dog", 1.0),
            sample(BACKGROUND_CLASS, 0.0),
            sample("cat", 0.3),
        ];
        let record = build_record(&classes, &samples).unwrap();

        assert_eq!(record.boxes.len(), 3);
        assert_eq!(record.gt_overlaps.entries(), &[(0, 2, 1.0), (2, 1, 0.3)]);
    }

    #[test]
    fn build_record_rejects_unknown_class() {
        let classes = with_background_class(["cat"]).unwrap();
        assert!(build_record(&classes, &[sample("bird", 0.7)]).is_err());
    }

    #[tokio::test]
    async fn csv_dataset_test() {
        let base_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("csv_dataset");
        let image_dir = base_dir.join("images");
        let label_file = base_dir.join("label.csv");
        let classes_file = base_dir.join("classes.txt");

        let mut dataset = CsvRoiDataset::load(&image_dir, label_file, classes_file)
            .await
            .unwrap();

        assert_eq!(dataset.num_images(), 3);
        assert_eq!(dataset.num_classes(), 3);
        assert_eq!(dataset.classes.get_index(0).unwrap(), BACKGROUND_CLASS);
        assert_eq!(dataset.image_path_at(1), Some(image_dir.join("b.png").as_path()));
        assert_eq!(dataset.records[0].boxes.len(), 3);
        assert_eq!(
            dataset.records[0].gt_overlaps.entries(),
            &[(0, 1, 1.0), (1, 1, 0.6)]
        );

        dataset.append_flipped_images().unwrap();
        assert_eq!(dataset.num_images(), 6);
        assert_eq!(dataset.image_path_at(3), dataset.image_path_at(0));

        let flipped = &dataset.records[3];
        assert!(flipped.flipped);
        assert_eq!(flipped.boxes[0].xyxy(), [36.0, 4.0, 59.0, 27.0]);
    }
}
