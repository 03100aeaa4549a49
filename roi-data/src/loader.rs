//! The training data loader driving every pipeline stage.

use crate::{
    common::*,
    config::TrainingConfig,
    dataset::{HeaderSizeReader, ImageSizeReader, RoiDataset},
    dispatch::{BlobAssembler, Dispatcher, Minibatch},
    enrich::enrich_records,
    filter::filter_records,
    normalize::{normalize_targets, NormalizationStats},
    observer::{LogObserver, PipelineObserver},
    record::ImageRecord,
    sampler::IndexSampler,
    targets::{add_regression_targets, BoxEncoder, DeltaEncoder, IouMatrix, PixelIou},
};

/// Prepares ROI records once and serves minibatches from them.
///
/// The loader goes through three phases. [RoiDataLoader::preprocess_for_training]
/// prepares the records, [RoiDataLoader::start_sampling] builds the sampler
/// and [RoiDataLoader::next_batch] draws minibatches indefinitely.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RoiDataLoader<A> {
    config: TrainingConfig,
    dataset: Box<dyn RoiDataset>,
    assembler: Arc<A>,
    #[derivative(Debug = "ignore")]
    observer: Arc<dyn PipelineObserver>,
    size_reader: Arc<dyn ImageSizeReader>,
    iou: Arc<dyn IouMatrix>,
    encoder: Arc<dyn BoxEncoder>,
    dataset_flipped: bool,
    prepared: Option<Prepared>,
    dispatcher: Option<Dispatcher<A>>,
}

#[derive(Debug)]
struct Prepared {
    records: Arc<Vec<ImageRecord>>,
    num_classes: usize,
    stats: Option<NormalizationStats>,
}

impl<A> RoiDataLoader<A>
where
    A: 'static + BlobAssembler,
    A::Output: 'static,
{
    pub fn new(
        config: TrainingConfig,
        dataset: Box<dyn RoiDataset>,
        assembler: A,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            dataset,
            assembler: Arc::new(assembler),
            observer: Arc::new(LogObserver),
            size_reader: Arc::new(HeaderSizeReader),
            iou: Arc::new(PixelIou),
            encoder: Arc::new(DeltaEncoder),
            dataset_flipped: false,
            prepared: None,
            dispatcher: None,
        })
    }

    pub fn with_observer(self, observer: Arc<dyn PipelineObserver>) -> Self {
        Self { observer, ..self }
    }

    pub fn with_size_reader(self, size_reader: Arc<dyn ImageSizeReader>) -> Self {
        Self {
            size_reader,
            ..self
        }
    }

    pub fn with_iou(self, iou: Arc<dyn IouMatrix>) -> Self {
        Self { iou, ..self }
    }

    pub fn with_encoder(self, encoder: Arc<dyn BoxEncoder>) -> Self {
        Self { encoder, ..self }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn dataset(&self) -> &dyn RoiDataset {
        self.dataset.as_ref()
    }

    /// Run flipping, enrichment, filtering, regression targets and
    /// normalization once.
    ///
    /// Any data-integrity fault aborts the run and leaves the loader
    /// unprepared. The dataset is flipped at most once, so a failed run can
    /// be retried.
    pub async fn preprocess_for_training(&mut self) -> Result<&[ImageRecord]> {
        ensure!(
            self.prepared.is_none(),
            "the records are already prepared for training"
        );
        let config = &self.config;
        let observer = &self.observer;

        // horizontal flip augmentation
        if config.use_flipped && !self.dataset_flipped {
            let num_before = self.dataset.num_images();
            self.dataset.append_flipped_images()?;
            self.dataset_flipped = true;
            observer.on_flipped(num_before, self.dataset.num_images());
        }

        // enrich records
        let records = enrich_records(self.dataset.as_ref(), self.size_reader.clone()).await?;

        // remove records without fg or bg ROIs
        let (records, report) = filter_records(records, &config.filter_thresholds());
        observer.on_filtered(&report);

        let (records, num_classes, stats) = if config.bbox_reg {
            let (records, num_classes) = add_regression_targets(
                records,
                config.bbox_thresh.raw(),
                self.iou.as_ref(),
                self.encoder.as_ref(),
            )?;
            observer.on_regression_targets(records.len());

            let stats = match &config.normalize_targets_precomputed {
                Some(precomputed) => NormalizationStats::precomputed(
                    num_classes,
                    precomputed.means(),
                    precomputed.stds(),
                ),
                None => {
                    NormalizationStats::empirical(&records, num_classes, config.epsilon.raw())?
                }
            };
            observer.on_normalization_stats(&stats);

            observer.on_targets_normalized(config.normalize_targets);
            let records = if config.normalize_targets {
                normalize_targets(records, &stats)?
            } else {
                records
            };

            (records, num_classes, Some(stats))
        } else {
            ensure!(!records.is_empty(), "no image records left after filtering");
            (records, self.dataset.num_classes(), None)
        };

        let prepared = self.prepared.insert(Prepared {
            records: Arc::new(records),
            num_classes,
            stats,
        });
        Ok(prepared.records.as_slice())
    }

    /// Build the sampler over the prepared records.
    ///
    /// The sampler is seeded from the configured seed, or from entropy if
    /// no seed is set. Calling it again restarts sampling.
    pub fn start_sampling(&mut self) -> Result<()> {
        let Prepared {
            records,
            num_classes,
            ..
        } = self
            .prepared
            .as_ref()
            .ok_or_else(|| format_err!("preprocess_for_training() must be called first"))?;

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sampler = IndexSampler::new(
            self.config.sampling_policy(),
            self.config.batch_size,
            records,
            rng,
        )?;

        self.dispatcher = Some(Dispatcher::new(
            records.clone(),
            *num_classes,
            sampler,
            self.assembler.clone(),
            self.observer.clone(),
        )?);
        Ok(())
    }

    /// Draw the next minibatch.
    pub fn next_batch(&self) -> Result<Minibatch<A::Output>> {
        self.dispatcher()?.next_batch()
    }

    /// Endless stream of minibatches, prefetched if configured.
    pub fn train_stream(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<Minibatch<A::Output>>> + Send>>> {
        let prefetch = self
            .config
            .use_prefetch
            .then(|| self.config.prefetch_depth);
        Ok(self.dispatcher()?.stream(prefetch))
    }

    /// The statistics used for target normalization.
    ///
    /// Returns `None` before preparation or with regression disabled.
    pub fn normalization_stats(&self) -> Option<&NormalizationStats> {
        self.prepared.as_ref()?.stats.as_ref()
    }

    /// The prepared records, if any.
    pub fn records(&self) -> Option<&[ImageRecord]> {
        Some(self.prepared.as_ref()?.records.as_slice())
    }

    pub fn num_classes(&self) -> Option<usize> {
        Some(self.prepared.as_ref()?.num_classes)
    }

    fn dispatcher(&self) -> Result<&Dispatcher<A>> {
        self.dispatcher
            .as_ref()
            .ok_or_else(|| format_err!("start_sampling() must be called first"))
    }
}

/// Enrich the dataset records without flipping, filtering or targets.
pub async fn preprocess_for_testing(
    dataset: &dyn RoiDataset,
    size_reader: Arc<dyn ImageSizeReader>,
) -> Result<Vec<ImageRecord>> {
    enrich_records(dataset, size_reader).await
}
