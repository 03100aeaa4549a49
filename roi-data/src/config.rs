//! Pipeline configuration format.

use crate::{common::*, filter::FilterThresholds, sampler::SamplingPolicy};

pub use dataset::*;
pub use training::*;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let config: Self = json5::from_str(&text)?;
        config.training.validate()?;
        Ok(config)
    }
}

mod dataset {
    use super::*;

    /// Variants of dataset and options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum DatasetConfig {
        /// CSV annotation file with one ROI per row.
        Csv {
            image_dir: PathBuf,
            label_file: PathBuf,
            classes_file: PathBuf,
        },
    }
}

mod training {
    use super::*;

    /// The record preparation and sampling options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        /// Minimum overlap of a foreground ROI, inclusive.
        #[serde(default = "default_fg_thresh")]
        pub fg_thresh: R64,
        /// Lower bound of the background overlap band, inclusive.
        #[serde(default = "default_bg_thresh_lo")]
        pub bg_thresh_lo: R64,
        /// Upper bound of the background overlap band, exclusive.
        #[serde(default = "default_bg_thresh_hi")]
        pub bg_thresh_hi: R64,
        /// Minimum overlap of an ROI to receive a regression target.
        #[serde(default = "default_bbox_thresh")]
        pub bbox_thresh: R64,
        /// If set, append horizontally flipped copies of every image.
        #[serde(default = "default_true")]
        pub use_flipped: bool,
        /// If set, sample contiguous permutation slices. Otherwise scan for
        /// records with at least one box.
        #[serde(default = "default_true")]
        pub has_region_proposal_mode: bool,
        /// The number of images per minibatch.
        #[serde(default = "default_batch_size")]
        pub batch_size: NonZeroUsize,
        /// If set, compute regression targets and their statistics.
        #[serde(default = "default_true")]
        pub bbox_reg: bool,
        /// If set, normalize regression targets by the class statistics.
        #[serde(default = "default_true")]
        pub normalize_targets: bool,
        /// Constant statistics. Statistics are estimated from the data if unset.
        #[serde(default = "default_precomputed")]
        pub normalize_targets_precomputed: Option<PrecomputedStats>,
        /// Added to class counts when estimating statistics.
        #[serde(default = "default_epsilon")]
        pub epsilon: R64,
        /// If set, assemble minibatches on a background worker.
        #[serde(default)]
        pub use_prefetch: bool,
        /// The maximum number of prefetched minibatches.
        #[serde(default = "default_prefetch_depth")]
        pub prefetch_depth: NonZeroUsize,
        /// The random seed of the sampler. Drawn from entropy if unset.
        #[serde(default)]
        pub seed: Option<u64>,
    }

    /// Constant per-coordinate means and standard deviations of deltas.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PrecomputedStats {
        pub means: [R64; 4],
        pub stds: [R64; 4],
    }

    impl PrecomputedStats {
        pub fn means(&self) -> [f64; 4] {
            self.means.map(R64::raw)
        }

        pub fn stds(&self) -> [f64; 4] {
            self.stds.map(R64::raw)
        }
    }

    impl Default for TrainingConfig {
        fn default() -> Self {
            Self {
                fg_thresh: default_fg_thresh(),
                bg_thresh_lo: default_bg_thresh_lo(),
                bg_thresh_hi: default_bg_thresh_hi(),
                bbox_thresh: default_bbox_thresh(),
                use_flipped: true,
                has_region_proposal_mode: true,
                batch_size: default_batch_size(),
                bbox_reg: true,
                normalize_targets: true,
                normalize_targets_precomputed: default_precomputed(),
                epsilon: default_epsilon(),
                use_prefetch: false,
                prefetch_depth: default_prefetch_depth(),
                seed: None,
            }
        }
    }

    impl TrainingConfig {
        pub fn validate(&self) -> Result<()> {
            let unit = r64(0.0)..=r64(1.0);
            [
                ("fg_thresh", self.fg_thresh),
                ("bg_thresh_lo", self.bg_thresh_lo),
                ("bg_thresh_hi", self.bg_thresh_hi),
                ("bbox_thresh", self.bbox_thresh),
            ]
            .iter()
            .try_for_each(|(name, value)| {
                ensure!(unit.contains(value), "{} must be in [0, 1]", name);
                Ok(())
            })?;

            ensure!(
                self.bg_thresh_lo <= self.bg_thresh_hi,
                "bg_thresh_lo must not exceed bg_thresh_hi"
            );
            ensure!(self.epsilon > 0.0, "epsilon must be positive");

            if let Some(precomputed) = &self.normalize_targets_precomputed {
                ensure!(
                    precomputed.stds.iter().all(|&std| std > 0.0),
                    "precomputed standard deviations must be positive"
                );
            }

            Ok(())
        }

        pub fn filter_thresholds(&self) -> FilterThresholds {
            FilterThresholds {
                fg_thresh: self.fg_thresh.raw(),
                bg_thresh_lo: self.bg_thresh_lo.raw(),
                bg_thresh_hi: self.bg_thresh_hi.raw(),
            }
        }

        pub fn sampling_policy(&self) -> SamplingPolicy {
            if self.has_region_proposal_mode {
                SamplingPolicy::Batch
            } else {
                SamplingPolicy::FilteredScan
            }
        }
    }

    fn default_fg_thresh() -> R64 {
        r64(0.5)
    }

    fn default_bg_thresh_lo() -> R64 {
        r64(0.1)
    }

    fn default_bg_thresh_hi() -> R64 {
        r64(0.5)
    }

    fn default_bbox_thresh() -> R64 {
        r64(0.5)
    }

    fn default_true() -> bool {
        true
    }

    fn default_batch_size() -> NonZeroUsize {
        NonZeroUsize::new(2).unwrap()
    }

    fn default_precomputed() -> Option<PrecomputedStats> {
        Some(PrecomputedStats {
            means: [r64(0.0); 4],
            stds: [r64(0.1), r64(0.1), r64(0.2), r64(0.2)],
        })
    }

    fn default_epsilon() -> R64 {
        r64(1e-14)
    }

    fn default_prefetch_depth() -> NonZeroUsize {
        NonZeroUsize::new(2).unwrap()
    }
}
