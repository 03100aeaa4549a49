//! Per-class statistics of regression deltas and target normalization.

use crate::{
    common::*,
    record::{BboxTarget, ImageRecord},
};

/// Per-class means and standard deviations of regression deltas.
///
/// Both vectors are flattened `num_classes x 4` arrays indexed by class.
/// In empirically computed statistics, a class without any example in the
/// dataset has mean zero and standard deviation zero. Such entries carry no
/// information and should not be used to de-normalize predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    num_classes: usize,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl NormalizationStats {
    /// Replicate constant statistics across every class.
    pub fn precomputed(num_classes: usize, means: [f64; 4], stds: [f64; 4]) -> Self {
        Self {
            num_classes,
            means: iter::repeat(means).take(num_classes).flatten().collect(),
            stds: iter::repeat(stds).take(num_classes).flatten().collect(),
        }
    }

    /// Estimate statistics from the targets of all foreground ROIs in one pass.
    ///
    /// `epsilon` is added to every class count so that classes without
    /// examples do not divide by zero.
    pub fn empirical(records: &[ImageRecord], num_classes: usize, epsilon: f64) -> Result<Self> {
        ensure!(epsilon > 0.0, "epsilon must be positive");

        let mut counts = vec![epsilon; num_classes];
        let mut sums = vec![[0.0; 4]; num_classes];
        let mut squared_sums = vec![[0.0; 4]; num_classes];

        records
            .iter()
            .flat_map(|record| &record.bbox_targets)
            .filter(|target| target.class != 0)
            .try_for_each(|target| -> Result<_> {
                let BboxTarget { class, delta } = *target;
                ensure!(
                    class < num_classes,
                    "target class {} exceeds the number of classes {}",
                    class,
                    num_classes
                );

                counts[class] += 1.0;
                izip!(&mut sums[class], &mut squared_sums[class], delta).for_each(
                    |(sum, squared_sum, value)| {
                        *sum += value;
                        *squared_sum += value * value;
                    },
                );
                Ok(())
            })?;

        let (means, stds): (Vec<_>, Vec<_>) = izip!(counts, sums, squared_sums)
            .flat_map(|(count, sum, squared_sum)| {
                izip!(sum, squared_sum).map(move |(sum, squared_sum)| {
                    let mean = sum / count;
                    // var(x) = E(x^2) - E(x)^2
                    let var = (squared_sum / count - mean * mean).max(0.0);
                    (mean, var.sqrt())
                })
            })
            .unzip();

        Ok(Self {
            num_classes,
            means,
            stds,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// The flattened means indexed by class.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// The flattened standard deviations indexed by class.
    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    pub fn class_means(&self, class: usize) -> Option<[f64; 4]> {
        class_slice(&self.means, class)
    }

    pub fn class_stds(&self, class: usize) -> Option<[f64; 4]> {
        class_slice(&self.stds, class)
    }

    /// The means averaged over foreground classes.
    pub fn foreground_mean_average(&self) -> [f64; 4] {
        foreground_average(&self.means, self.num_classes)
    }

    /// The standard deviations averaged over foreground classes.
    pub fn foreground_std_average(&self) -> [f64; 4] {
        foreground_average(&self.stds, self.num_classes)
    }

    /// Center and scale a delta of the class.
    ///
    /// Components with zero standard deviation are only centered.
    pub fn normalize(&self, class: usize, delta: [f64; 4]) -> Result<[f64; 4]> {
        let (means, stds) = self.class_pair(class)?;
        let mut output = delta;
        izip!(&mut output, means, stds).for_each(|(value, mean, std)| {
            *value -= mean;
            if std > 0.0 {
                *value /= std;
            }
        });
        Ok(output)
    }

    /// Undo [NormalizationStats::normalize] on a predicted delta.
    pub fn denormalize(&self, class: usize, delta: [f64; 4]) -> Result<[f64; 4]> {
        let (means, stds) = self.class_pair(class)?;
        let mut output = delta;
        izip!(&mut output, means, stds).for_each(|(value, mean, std)| {
            if std > 0.0 {
                *value *= std;
            }
            *value += mean;
        });
        Ok(output)
    }

    fn class_pair(&self, class: usize) -> Result<([f64; 4], [f64; 4])> {
        let means = self.class_means(class);
        let stds = self.class_stds(class);
        means.zip(stds).ok_or_else(|| {
            format_err!(
                "class {} is out of the {} normalized classes",
                class,
                self.num_classes
            )
        })
    }
}

/// Normalize the targets of every foreground ROI in place.
///
/// Background targets are left untouched.
pub fn normalize_targets(
    records: Vec<ImageRecord>,
    stats: &NormalizationStats,
) -> Result<Vec<ImageRecord>> {
    records
        .into_iter()
        .map(|mut record| -> Result<_> {
            record
                .bbox_targets
                .iter_mut()
                .filter(|target| target.class != 0)
                .try_for_each(|target| -> Result<_> {
                    target.delta = stats.normalize(target.class, target.delta)?;
                    Ok(())
                })?;
            Ok(record)
        })
        .try_collect()
}

fn class_slice(values: &[f64], class: usize) -> Option<[f64; 4]> {
    let slice = values.get((class * 4)..(class * 4 + 4))?;
    Some([slice[0], slice[1], slice[2], slice[3]])
}

fn foreground_average(values: &[f64], num_classes: usize) -> [f64; 4] {
    let mut average = [0.0; 4];
    if num_classes <= 1 {
        return average;
    }

    values.chunks(4).skip(1).for_each(|chunk| {
        izip!(&mut average, chunk).for_each(|(avg, value)| *avg += value);
    });
    let num_fg = (num_classes - 1) as f64;
    average.iter_mut().for_each(|avg| *avg /= num_fg);
    average
}
