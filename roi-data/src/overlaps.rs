//! Sparse ground-truth overlap matrices and their per-ROI densified form.

use crate::common::*;

/// The sparse (ROI x class) overlap matrix of one image.
///
/// Missing entries are zero. Column zero is the background class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSparseOverlaps")]
pub struct SparseOverlaps {
    num_rois: usize,
    num_classes: usize,
    /// `(roi, class, overlap)` triples sorted by ROI then class.
    entries: Vec<(usize, usize, f64)>,
}

impl SparseOverlaps {
    pub fn new(
        num_rois: usize,
        num_classes: usize,
        entries: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self> {
        ensure!(num_classes > 0, "the overlap matrix must have at least one class column");

        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by_key(|&(roi, class, _)| (roi, class));

        entries.iter().try_for_each(|&(roi, class, overlap)| {
            ensure!(
                roi < num_rois && class < num_classes,
                "overlap entry ({}, {}) is out of the {}x{} matrix",
                roi,
                class,
                num_rois,
                num_classes
            );
            ensure!(
                (0.0..=1.0).contains(&overlap),
                "overlap value {} at ({}, {}) is not in [0, 1]",
                overlap,
                roi,
                class
            );
            Ok(())
        })?;

        let has_duplicates = entries
            .iter()
            .tuple_windows()
            .any(|(lhs, rhs)| (lhs.0, lhs.1) == (rhs.0, rhs.1));
        ensure!(!has_duplicates, "duplicated entries in the overlap matrix");

        Ok(Self {
            num_rois,
            num_classes,
            entries,
        })
    }

    /// Build from dense rows, dropping zero entries.
    pub fn from_dense(num_classes: usize, rows: &[Vec<f64>]) -> Result<Self> {
        rows.iter().enumerate().try_for_each(|(roi, row)| {
            ensure!(
                row.len() == num_classes,
                "row {} has {} columns, expect {}",
                roi,
                row.len(),
                num_classes
            );
            Ok(())
        })?;

        let entries = rows.iter().enumerate().flat_map(|(roi, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, &overlap)| overlap != 0.0)
                .map(move |(class, &overlap)| (roi, class, overlap))
        });

        Self::new(rows.len(), num_classes, entries)
    }

    pub fn num_rois(&self) -> usize {
        self.num_rois
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn entries(&self) -> &[(usize, usize, f64)] {
        &self.entries
    }

    pub fn get(&self, roi: usize, class: usize) -> f64 {
        self.entries
            .binary_search_by_key(&(roi, class), |&(roi, class, _)| (roi, class))
            .map(|index| self.entries[index].2)
            .unwrap_or(0.0)
    }

    /// Reduce every row to its maximum overlap and the class achieving it.
    ///
    /// Ties resolve to the lowest class index, so a row without any positive
    /// entry maps to `(0.0, 0)`. The matrix must have exactly `num_boxes`
    /// rows.
    pub fn densify(&self, num_boxes: usize) -> Result<DenseOverlaps> {
        ensure!(
            self.num_rois == num_boxes,
            "the overlap matrix has {} rows but the image declares {} boxes",
            self.num_rois,
            num_boxes
        );

        let mut max_overlaps = vec![0.0; self.num_rois];
        let mut max_classes = vec![0; self.num_rois];

        // entries are sorted by class within a row, so a strict comparison
        // keeps the lowest class among equal maxima
        self.entries.iter().for_each(|&(roi, class, overlap)| {
            if overlap > max_overlaps[roi] {
                max_overlaps[roi] = overlap;
                max_classes[roi] = class;
            }
        });

        Ok(DenseOverlaps {
            max_overlaps,
            max_classes,
        })
    }
}

/// The unchecked serialized form of [SparseOverlaps].
#[derive(Debug, Clone, Deserialize)]
struct RawSparseOverlaps {
    num_rois: usize,
    num_classes: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl TryFrom<RawSparseOverlaps> for SparseOverlaps {
    type Error = Error;

    fn try_from(raw: RawSparseOverlaps) -> Result<Self, Self::Error> {
        let RawSparseOverlaps {
            num_rois,
            num_classes,
            entries,
        } = raw;
        Self::new(num_rois, num_classes, entries)
    }
}

/// Per-ROI maximum overlap and argmax class.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseOverlaps {
    pub max_overlaps: Vec<f64>,
    pub max_classes: Vec<usize>,
}

impl DenseOverlaps {
    /// Find the first ROI breaking `max_overlap == 0 <=> max_class == 0`.
    pub fn find_background_violation(&self) -> Option<usize> {
        izip!(&self.max_overlaps, &self.max_classes)
            .position(|(&overlap, &class)| (overlap == 0.0) != (class == 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn densify_picks_max_and_lowest_class_on_tie() {
        let overlaps = SparseOverlaps::from_dense(
            4,
            &[
                vec![0.0, 0.3, 0.7, 0.1],
                vec![0.0, 0.5, 0.0, 0.5],
                vec![0.0, 0.0, 0.0, 0.0],
            ],
        )
        .unwrap();
        let dense = overlaps.densify(3).unwrap();

        assert_eq!(dense.max_overlaps, vec![0.7, 0.5, 0.0]);
        assert_eq!(dense.max_classes, vec![2, 1, 0]);
        assert_eq!(dense.find_background_violation(), None);
    }

    #[test]
    fn densify_rejects_shape_mismatch() {
        let overlaps = SparseOverlaps::new(0, 3, vec![]).unwrap();
        assert!(overlaps.densify(2).is_err());
        assert!(overlaps.densify(0).unwrap().max_overlaps.is_empty());
    }

    #[test]
    fn sparse_overlaps_validation() {
        assert!(SparseOverlaps::new(2, 3, vec![(2, 0, 0.5)]).is_err());
        assert!(SparseOverlaps::new(2, 3, vec![(0, 3, 0.5)]).is_err());
        assert!(SparseOverlaps::new(2, 3, vec![(0, 1, 1.5)]).is_err());
        assert!(SparseOverlaps::new(2, 3, vec![(0, 1, 0.5), (0, 1, 0.2)]).is_err());

        let overlaps = SparseOverlaps::new(2, 3, vec![(1, 2, 0.4), (0, 1, 1.0)]).unwrap();
        assert_eq!(overlaps.get(0, 1), 1.0);
        assert_eq!(overlaps.get(1, 2), 0.4);
        assert_eq!(overlaps.get(1, 1), 0.0);
    }

    #[test]
    fn deserialize_sorts_and_validates_entries() {
        let overlaps: SparseOverlaps =
            json5::from_str("{num_rois: 1, num_classes: 3, entries: [[0, 2, 0.5], [0, 1, 0.5]]}")
                .unwrap();
        assert_eq!(overlaps.entries(), &[(0, 1, 0.5), (0, 2, 0.5)]);
        assert_eq!(overlaps.get(0, 1), 0.5);
        assert_eq!(overlaps.densify(1).unwrap().max_classes, vec![1]);

        let result: Result<SparseOverlaps, _> =
            json5::from_str("{num_rois: 1, num_classes: 2, entries: [[5, 1, 0.5]]}");
        assert!(result.is_err());

        let result: Result<SparseOverlaps, _> =
            json5::from_str("{num_rois: 1, num_classes: 2, entries: [[0, 1, 0.5], [0, 1, 0.7]]}");
        assert!(result.is_err());
    }

    #[test]
    fn background_column_breaks_invariant() {
        let overlaps = SparseOverlaps::new(2, 3, vec![(0, 1, 0.9), (1, 0, 0.6)]).unwrap();
        let dense = overlaps.densify(2).unwrap();
        assert_eq!(dense.find_background_violation(), Some(1));
    }
}
