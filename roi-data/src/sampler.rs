//! Endless shuffled sampling of record indices.

use crate::{common::*, record::ImageRecord};

/// The rule selecting indices from the permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplingPolicy {
    /// Take contiguous slices of the permutation, re-shuffling before a
    /// slice would run past the end.
    Batch,
    /// Scan the permutation one index at a time, admitting only records with
    /// at least one box and re-shuffling whenever the end is reached.
    FilteredScan,
}

/// Whether the permutation still has unconsumed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerState {
    Ready,
    Exhausted,
}

/// Serves fixed-size batches of record indices from a reshuffled permutation.
///
/// The sampler only holds an index space. Its indices are valid for the
/// record collection it was built from.
#[derive(Debug)]
pub struct IndexSampler {
    policy: SamplingPolicy,
    batch_size: usize,
    admissible: Vec<bool>,
    permutation: Vec<usize>,
    cursor: usize,
    num_shuffles: usize,
    rng: StdRng,
}

impl IndexSampler {
    pub fn new(
        policy: SamplingPolicy,
        batch_size: NonZeroUsize,
        records: &[ImageRecord],
        rng: StdRng,
    ) -> Result<Self> {
        let admissible: Vec<_> = records.iter().map(ImageRecord::has_boxes).collect();
        Self::with_admissible(policy, batch_size, admissible, rng)
    }

    /// Build the sampler from a per-record admission mask.
    ///
    /// The mask is only consulted under [SamplingPolicy::FilteredScan].
    pub fn with_admissible(
        policy: SamplingPolicy,
        batch_size: NonZeroUsize,
        admissible: Vec<bool>,
        rng: StdRng,
    ) -> Result<Self> {
        let batch_size = batch_size.get();
        let num_records = admissible.len();
        ensure!(num_records > 0, "cannot sample from an empty record collection");

        match policy {
            SamplingPolicy::Batch => {
                ensure!(
                    batch_size <= num_records,
                    "batch size {} exceeds the number of records {}",
                    batch_size,
                    num_records
                );
            }
            SamplingPolicy::FilteredScan => {
                // with one admissible record, every full pass admits at least
                // one index, so a batch completes within batch_size passes
                ensure!(
                    admissible.iter().any(|&flag| flag),
                    "no record has boxes to sample"
                );
            }
        }

        let mut sampler = Self {
            policy,
            batch_size,
            admissible,
            permutation: (0..num_records).collect(),
            cursor: 0,
            num_shuffles: 0,
            rng,
        };
        sampler.permutation.shuffle(&mut sampler.rng);
        Ok(sampler)
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_records(&self) -> usize {
        self.permutation.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of re-shuffles since construction.
    pub fn num_shuffles(&self) -> usize {
        self.num_shuffles
    }

    pub fn state(&self) -> SamplerState {
        if self.cursor < self.permutation.len() {
            SamplerState::Ready
        } else {
            SamplerState::Exhausted
        }
    }

    /// Draw the next batch of exactly `batch_size` indices.
    pub fn next_indices(&mut self) -> Vec<usize> {
        match self.policy {
            SamplingPolicy::Batch => self.next_batch_slice(),
            SamplingPolicy::FilteredScan => self.next_filtered_scan(),
        }
    }

    fn next_batch_slice(&mut self) -> Vec<usize> {
        if self.cursor + self.batch_size > self.permutation.len() {
            self.reshuffle();
        }

        let range = self.cursor..(self.cursor + self.batch_size);
        self.cursor += self.batch_size;
        self.permutation[range].to_vec()
    }

    fn next_filtered_scan(&mut self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.batch_size);

        while indices.len() < self.batch_size {
            let index = self.permutation[self.cursor];
            if self.admissible[index] {
                indices.push(index);
            }

            self.cursor += 1;
            if self.cursor >= self.permutation.len() {
                self.reshuffle();
            }
        }

        indices
    }

    fn reshuffle(&mut self) {
        self.permutation.shuffle(&mut self.rng);
        self.cursor = 0;
        self.num_shuffles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_size(size: usize) -> NonZeroUsize {
        NonZeroUsize::new(size).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn batch_mode_full_cycle_is_permutation() {
        let mut sampler = IndexSampler::with_admissible(
            SamplingPolicy::Batch,
            batch_size(3),
            vec![true; 6],
            rng(),
        )
        .unwrap();

        for _ in 0..5 {
            let mut cycle: Vec<_> = (0..2).flat_map(|_| sampler.next_indices()).collect();
            assert_eq!(sampler.state(), SamplerState::Exhausted);
            cycle.sort_unstable();
            assert_eq!(cycle, (0..6).collect::<Vec<_>>());
        }
    }

    #[test]
    fn batch_mode_reshuffles_before_overrun() {
        let mut sampler = IndexSampler::with_admissible(
            SamplingPolicy::Batch,
            batch_size(2),
            vec![true; 7],
            rng(),
        )
        .unwrap();

        for cycle in 0..4 {
            let batches: Vec<_> = (0..3).map(|_| sampler.next_indices()).collect();
            assert!(batches.iter().all(|batch| batch.len() == 2));

            let indices: HashSet<_> = batches.iter().flatten().copied().collect();
            assert_eq!(indices.len(), 6);
            assert!(indices.iter().all(|&index| index < 7));

            // the first batch of the next cycle triggers a re-shuffle
            assert_eq!(sampler.cursor(), 6);
            assert_eq!(sampler.num_shuffles(), cycle);
        }
    }

    #[test]
    fn filtered_scan_skips_empty_records() {
        let admissible = vec![false, true, false, true, true, false, false];
        let mut sampler = IndexSampler::with_admissible(
            SamplingPolicy::FilteredScan,
            batch_size(4),
            admissible.clone(),
            rng(),
        )
        .unwrap();

        for _ in 0..50 {
            let batch = sampler.next_indices();
            assert_eq!(batch.len(), 4);
            assert!(batch.iter().all(|&index| admissible[index]));
        }
        assert!(sampler.num_shuffles() > 0);
    }

    #[test]
    fn filtered_scan_with_single_admissible_record() {
        let mut sampler = IndexSampler::with_admissible(
            SamplingPolicy::FilteredScan,
            batch_size(3),
            vec![false, false, true],
            rng(),
        )
        .unwrap();
        assert_eq!(sampler.next_indices(), vec![2, 2, 2]);
    }

    #[test]
    fn reject_unsatisfiable_samplers() {
        assert!(IndexSampler::with_admissible(
            SamplingPolicy::Batch,
            batch_size(1),
            vec![],
            rng()
        )
        .is_err());
        assert!(IndexSampler::with_admissible(
            SamplingPolicy::Batch,
            batch_size(4),
            vec![true; 3],
            rng()
        )
        .is_err());
        assert!(IndexSampler::with_admissible(
            SamplingPolicy::FilteredScan,
            batch_size(1),
            vec![false; 3],
            rng()
        )
        .is_err());
    }

    #[test]
    fn same_seed_same_batches() {
        let draw = || {
            let mut sampler = IndexSampler::with_admissible(
                SamplingPolicy::Batch,
                batch_size(2),
                vec![true; 10],
                rng(),
            )
            .unwrap();
            (0..8).map(|_| sampler.next_indices()).collect::<Vec<_>>()
        };
        assert_eq!(draw(), draw());
    }
}
