//! Bounding-box regression targets.

use crate::{
    common::*,
    record::{BboxTarget, ImageRecord},
};

/// Computes the dense IoU matrix between two box lists.
pub trait IouMatrix
where
    Self: Debug + Send + Sync,
{
    /// Rows index `boxes`, columns index `query_boxes`.
    fn overlaps(&self, boxes: &[RoiBox], query_boxes: &[RoiBox]) -> Array2<f64>;
}

/// Encodes the regression delta between an example box and its target box.
pub trait BoxEncoder
where
    Self: Debug + Send + Sync,
{
    fn encode(&self, example: &RoiBox, target: &RoiBox) -> [f64; 4];

    /// Recover the target box from an example box and its delta.
    fn decode(&self, example: &RoiBox, delta: [f64; 4]) -> Result<RoiBox>;
}

/// IoU on inclusive pixel coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelIou;

impl IouMatrix for PixelIou {
    fn overlaps(&self, boxes: &[RoiBox], query_boxes: &[RoiBox]) -> Array2<f64> {
        bbox_overlaps(boxes, query_boxes)
    }
}

/// The center offset and log-size delta encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaEncoder;

impl BoxEncoder for DeltaEncoder {
    fn encode(&self, example: &RoiBox, target: &RoiBox) -> [f64; 4] {
        BoxDelta::encode(example, target).to_array()
    }

    fn decode(&self, example: &RoiBox, delta: [f64; 4]) -> Result<RoiBox> {
        BoxDelta::from_array(delta).apply(example)
    }
}

/// Compute the regression target of every ROI of one image.
///
/// ROIs with overlap exactly one are ground truths. Every ROI with overlap
/// at least `bbox_thresh` is assigned to the ground truth it overlaps most
/// and gets its class with the encoded delta. The remaining ROIs, or all
/// ROIs of an image without ground truth, get zero targets.
pub fn compute_targets(
    record: &ImageRecord,
    bbox_thresh: f64,
    iou: &dyn IouMatrix,
    encoder: &dyn BoxEncoder,
) -> Vec<BboxTarget> {
    let ImageRecord {
        ref boxes,
        ref max_overlaps,
        ref max_classes,
        ..
    } = *record;
    let mut targets = vec![BboxTarget::ZERO; boxes.len()];

    let gt_inds: Vec<_> = max_overlaps
        .iter()
        .positions(|&overlap| overlap == 1.0)
        .collect();
    if gt_inds.is_empty() {
        return targets;
    }

    let ex_inds: Vec<_> = max_overlaps
        .iter()
        .positions(|&overlap| overlap >= bbox_thresh)
        .collect();

    let gt_boxes: Vec<_> = gt_inds.iter().map(|&index| boxes[index]).collect();
    let ex_boxes: Vec<_> = ex_inds.iter().map(|&index| boxes[index]).collect();
    let ex_gt_overlaps = iou.overlaps(&ex_boxes, &gt_boxes);

    izip!(&ex_inds, ex_gt_overlaps.outer_iter()).for_each(|(&ex_index, row)| {
        let assigned = first_argmax(row.iter().copied()).unwrap_or(0);
        let gt_index = gt_inds[assigned];
        targets[ex_index] = BboxTarget {
            class: max_classes[ex_index],
            delta: encoder.encode(&boxes[ex_index], &boxes[gt_index]),
        };
    });

    targets
}

/// Attach regression targets to every record.
///
/// Returns the records with the number of classes, including background,
/// inferred from the overlap matrix of the first record.
pub fn add_regression_targets(
    records: Vec<ImageRecord>,
    bbox_thresh: f64,
    iou: &dyn IouMatrix,
    encoder: &dyn BoxEncoder,
) -> Result<(Vec<ImageRecord>, usize)> {
    let num_classes = match records.first() {
        Some(record) => record.gt_overlaps.num_classes(),
        None => bail!("no image records left to compute regression targets"),
    };

    if let Some(index) = records
        .iter()
        .position(|record| record.gt_overlaps.num_classes() != num_classes)
    {
        bail!(
            "record {} has {} classes while the first record has {}",
            index,
            records[index].gt_overlaps.num_classes(),
            num_classes
        );
    }

    let records: Vec<_> = records
        .into_iter()
        .map(|record| {
            let bbox_targets = compute_targets(&record, bbox_thresh, iou, encoder);
            ImageRecord {
                bbox_targets,
                ..record
            }
        })
        .collect();

    Ok((records, num_classes))
}

/// Index of the maximum, the first one among equal maxima.
fn first_argmax(values: impl IntoIterator<Item = f64>) -> Option<usize> {
    values
        .into_iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, value)| match best {
            Some((_, best_value)) if value <= best_value => best,
            _ => Some((index, value)),
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlaps::SparseOverlaps;
    use approx::assert_abs_diff_eq;

    fn record(boxes: &[[f64; 4]], max_overlaps: &[f64], max_classes: &[usize]) -> ImageRecord {
        let num_rois = boxes.len();
        ImageRecord {
            image_path: PathBuf::from("a.png"),
            width: 200,
            height: 200,
            flipped: false,
            boxes: boxes
                .iter()
                .map(|&xyxy| PixelBox::try_from_xyxy(xyxy).unwrap())
                .collect(),
            gt_overlaps: SparseOverlaps::new(num_rois, 3, vec![]).unwrap(),
            max_overlaps: max_overlaps.to_vec(),
            max_classes: max_classes.to_vec(),
            bbox_targets: vec![BboxTarget::ZERO; num_rois],
        }
    }

    #[test]
    fn first_argmax_prefers_lowest_index() {
        assert_eq!(first_argmax(vec![0.2, 0.7, 0.7, 0.1]), Some(1));
        assert_eq!(first_argmax(vec![0.0, 0.0]), Some(0));
        assert_eq!(first_argmax(vec![]), None);
    }

    #[test]
    fn no_ground_truth_gives_zero_targets() {
        let record = record(&[[0.0, 0.0, 9.0, 9.0]], &[0.8], &[1]);
        let targets = compute_targets(&record, 0.5, &PixelIou, &DeltaEncoder);
        assert_eq!(targets, vec![BboxTarget::ZERO]);
    }

    #[test]
    fn examples_follow_best_ground_truth() {
        let record = record(
            &[
                [0.0, 0.0, 9.0, 9.0],
                [100.0, 100.0, 119.0, 119.0],
                [2.0, 0.0, 11.0, 9.0],
                [104.0, 100.0, 123.0, 119.0],
                [50.0, 50.0, 59.0, 59.0],
            ],
            &[1.0, 1.0, 0.6, 0.7, 0.2],
            &[1, 2, 1, 2, 1],
        );
        let targets = compute_targets(&record, 0.5, &PixelIou, &DeltaEncoder);

        assert_eq!(targets[0].class, 1);
        assert_eq!(targets[0].delta, [0.0; 4]);
        assert_eq!(targets[1].class, 2);

        assert_eq!(targets[2].class, 1);
        assert_abs_diff_eq!(targets[2].delta[0], -0.2);
        assert_abs_diff_eq!(targets[2].delta[2], 0.0);

        assert_eq!(targets[3].class, 2);
        assert_abs_diff_eq!(targets[3].delta[0], -0.2);

        assert!(targets[4].is_zero());
    }

    #[test]
    fn denormalized_delta_decodes_to_ground_truth() {
        use crate::normalize::NormalizationStats;

        let example = PixelBox::try_from_xyxy([2.0, 0.0, 11.0, 9.0]).unwrap();
        let truth = PixelBox::try_from_xyxy([0.0, 0.0, 9.0, 9.0]).unwrap();
        let stats = NormalizationStats::precomputed(2, [0.0; 4], [0.1, 0.1, 0.2, 0.2]);

        let normalized = stats
            .normalize(1, DeltaEncoder.encode(&example, &truth))
            .unwrap();
        let delta = stats.denormalize(1, normalized).unwrap();
        let decoded = DeltaEncoder.decode(&example, delta).unwrap();

        izip!(decoded.xyxy(), truth.xyxy()).for_each(|(lhs, rhs)| {
            assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9);
        });
    }

    #[test]
    fn add_targets_requires_records() {
        assert!(add_regression_targets(vec![], 0.5, &PixelIou, &DeltaEncoder).is_err());
    }
}
