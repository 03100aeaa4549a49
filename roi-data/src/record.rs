use crate::{common::*, overlaps::SparseOverlaps};

/// The raw per-image ROI record supplied by a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    /// ROI boxes in pixel units.
    pub boxes: Vec<RoiBox>,
    /// Ground-truth overlaps, one row per box.
    pub gt_overlaps: SparseOverlaps,
    /// Set if this record mirrors another record horizontally.
    pub flipped: bool,
}

impl RoiRecord {
    /// Build the horizontally mirrored copy of this record.
    pub fn flip_horizontal(&self, image_width: usize) -> Result<Self> {
        let width = image_width as f64;
        let boxes: Vec<_> = self
            .boxes
            .iter()
            .map(|bbox| bbox.flip_horizontal(width))
            .try_collect()?;

        Ok(Self {
            boxes,
            gt_overlaps: self.gt_overlaps.clone(),
            flipped: !self.flipped,
        })
    }
}

/// The regression target of one ROI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BboxTarget {
    /// Class label, zero for ROIs without a regression target.
    pub class: usize,
    pub delta: [f64; 4],
}

impl BboxTarget {
    pub const ZERO: Self = Self {
        class: 0,
        delta: [0.0; 4],
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The `(class, dx, dy, dw, dh)` tuple.
    pub fn to_array(&self) -> [f64; 5] {
        let [dx, dy, dw, dh] = self.delta;
        [self.class as f64, dx, dy, dw, dh]
    }
}

/// The image record enriched with derived training statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub flipped: bool,
    pub boxes: Vec<RoiBox>,
    pub gt_overlaps: SparseOverlaps,
    pub max_overlaps: Vec<f64>,
    pub max_classes: Vec<usize>,
    /// Regression targets, all zero until the targets are computed.
    pub bbox_targets: Vec<BboxTarget>,
}

impl ImageRecord {
    pub fn num_rois(&self) -> usize {
        self.boxes.len()
    }

    pub fn has_boxes(&self) -> bool {
        !self.boxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_target_tuple() {
        let target = BboxTarget {
            class: 2,
            delta: [0.5, -0.25, 0.0, 1.0],
        };
        assert_eq!(target.to_array(), [2.0, 0.5, -0.25, 0.0, 1.0]);
        assert!(!target.is_zero());
        assert_eq!(BboxTarget::ZERO.to_array(), [0.0; 5]);
    }

    #[test]
    fn flip_keeps_overlaps_and_toggles_flag() {
        let record = RoiRecord {
            boxes: vec![PixelBox::try_from_xyxy([0.0, 5.0, 9.0, 14.0]).unwrap()],
            gt_overlaps: SparseOverlaps::new(1, 2, vec![(0, 1, 1.0)]).unwrap(),
            flipped: false,
        };
        let flipped = record.flip_horizontal(30).unwrap();

        assert!(flipped.flipped);
        assert_eq!(flipped.gt_overlaps, record.gt_overlaps);
        assert_eq!(flipped.boxes[0].xyxy(), [20.0, 5.0, 29.0, 14.0]);
        assert!(!flipped.flip_horizontal(30).unwrap().flipped);
    }
}
