use crate::{common::*, PixelBox};

/// Compute the dense IoU matrix between two box lists.
///
/// The row index runs over `boxes` and the column index over `query_boxes`.
pub fn bbox_overlaps<T>(boxes: &[PixelBox<T>], query_boxes: &[PixelBox<T>]) -> Array2<T>
where
    T: Float,
{
    let mut overlaps = Array2::zeros((boxes.len(), query_boxes.len()));

    query_boxes
        .iter()
        .enumerate()
        .for_each(|(col, query)| {
            boxes.iter().enumerate().for_each(|(row, bbox)| {
                overlaps[[row, col]] = bbox.iou_with(query);
            });
        });

    overlaps
}
