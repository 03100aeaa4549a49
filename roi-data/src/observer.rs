//! Diagnostics emitted while preparing and sampling records.

use crate::{common::*, filter::FilterReport, normalize::NormalizationStats};

/// Receives pipeline diagnostics.
///
/// Every method defaults to doing nothing. The events are informational and
/// never alter the pipeline.
pub trait PipelineObserver
where
    Self: Send + Sync,
{
    /// Horizontally flipped records were appended to the dataset.
    fn on_flipped(&self, _num_before: usize, _num_after: usize) {}

    /// Records without usable ROIs were removed.
    fn on_filtered(&self, _report: &FilterReport) {}

    /// Regression targets were computed for the given number of records.
    fn on_regression_targets(&self, _num_records: usize) {}

    /// The normalization statistics were determined.
    fn on_normalization_stats(&self, _stats: &NormalizationStats) {}

    /// Targets were normalized if `enabled` is set, left raw otherwise.
    fn on_targets_normalized(&self, _enabled: bool) {}

    /// The sampler drew a fresh permutation.
    fn on_reshuffle(&self, _num_shuffles: usize) {}
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_flipped(&self, num_before: usize, num_after: usize) {
        info!(
            "appended horizontally flipped records: {} -> {}",
            num_before, num_after
        );
    }

    fn on_filtered(&self, report: &FilterReport) {
        info!(
            "filtered {} image records: {} -> {}",
            report.num_removed(),
            report.num_before,
            report.num_after
        );
    }

    fn on_regression_targets(&self, num_records: usize) {
        info!(
            "computed bounding-box regression targets for {} records",
            num_records
        );
    }

    fn on_normalization_stats(&self, stats: &NormalizationStats) {
        let num_classes = stats.num_classes();
        (0..num_classes).for_each(|class| {
            debug!(
                "class {}: means {:?}, stds {:?}",
                class,
                stats.class_means(class).unwrap_or_default(),
                stats.class_stds(class).unwrap_or_default()
            );
        });
        info!(
            "bbox target means {:?}, stds {:?} (averaged over {} foreground classes)",
            stats.foreground_mean_average(),
            stats.foreground_std_average(),
            num_classes.saturating_sub(1)
        );
    }

    fn on_targets_normalized(&self, enabled: bool) {
        if enabled {
            info!("normalizing targets");
        } else {
            info!("not normalizing targets");
        }
    }

    fn on_reshuffle(&self, num_shuffles: usize) {
        debug!("re-shuffled record indices ({} times)", num_shuffles);
    }
}
