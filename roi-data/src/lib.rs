//! ROI record preparation and minibatch sampling for region-based detectors.
//!
//! Raw per-image ROI records are enriched with image dimensions and overlap
//! statistics, filtered, given normalized bounding-box regression targets and
//! finally served as shuffled minibatches.

mod common;

pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod enrich;
pub mod filter;
pub mod loader;
pub mod normalize;
pub mod observer;
pub mod overlaps;
pub mod record;
pub mod sampler;
pub mod targets;

pub use loader::{preprocess_for_testing, RoiDataLoader};
