//! Remove image records without usable ROIs.

use crate::{common::*, record::ImageRecord};

/// Overlap thresholds classifying ROIs into foreground and background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterThresholds {
    /// Inclusive lower bound of foreground overlaps.
    pub fg_thresh: f64,
    /// Inclusive lower bound of the background band.
    pub bg_thresh_lo: f64,
    /// Exclusive upper bound of the background band.
    pub bg_thresh_hi: f64,
}

impl FilterThresholds {
    pub fn is_foreground(&self, overlap: f64) -> bool {
        overlap >= self.fg_thresh
    }

    pub fn is_background(&self, overlap: f64) -> bool {
        overlap >= self.bg_thresh_lo && overlap < self.bg_thresh_hi
    }

    /// A record is valid if it has at least one foreground or background ROI.
    pub fn is_valid(&self, record: &ImageRecord) -> bool {
        record
            .max_overlaps
            .iter()
            .any(|&overlap| self.is_foreground(overlap) || self.is_background(overlap))
    }
}

/// The record counts before and after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterReport {
    pub num_before: usize,
    pub num_after: usize,
}

impl FilterReport {
    pub fn num_removed(&self) -> usize {
        self.num_before - self.num_after
    }
}

/// Keep the valid records in their original order.
pub fn filter_records(
    records: Vec<ImageRecord>,
    thresholds: &FilterThresholds,
) -> (Vec<ImageRecord>, FilterReport) {
    let num_before = records.len();
    let records: Vec<_> = records
        .into_iter()
        .filter(|record| thresholds.is_valid(record))
        .collect();
    let report = FilterReport {
        num_before,
        num_after: records.len(),
    };
    (records, report)
}
