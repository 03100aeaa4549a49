//! Minibatch dispatching on top of the index sampler.

use crate::{common::*, observer::PipelineObserver, record::ImageRecord, sampler::IndexSampler};
use tokio::sync::mpsc;

/// Turns the records of one minibatch into network input blobs.
pub trait BlobAssembler
where
    Self: Debug + Send + Sync,
{
    type Output: Send;

    fn assemble(&self, records: &[ImageRecord], num_classes: usize) -> Result<Self::Output>;
}

/// Passes owned copies of the sampled records through.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordListAssembler;

impl BlobAssembler for RecordListAssembler {
    type Output = Vec<ImageRecord>;

    fn assemble(&self, records: &[ImageRecord], _num_classes: usize) -> Result<Self::Output> {
        Ok(records.to_vec())
    }
}

/// The sampled record indices with their assembled blobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Minibatch<T> {
    pub indices: Vec<usize>,
    pub blobs: T,
}

/// Draws index batches and assembles the selected records.
///
/// Clones share the record collection and the sampler state. Every call
/// to [Dispatcher::next_batch] holds the sampler lock only while drawing
/// indices.
#[derive(Derivative)]
#[derivative(Debug, Clone(bound = ""))]
pub struct Dispatcher<A> {
    records: Arc<Vec<ImageRecord>>,
    num_classes: usize,
    sampler: Arc<Mutex<IndexSampler>>,
    assembler: Arc<A>,
    #[derivative(Debug = "ignore")]
    observer: Arc<dyn PipelineObserver>,
}

impl<A> Dispatcher<A>
where
    A: 'static + BlobAssembler,
    A::Output: 'static,
{
    pub fn new(
        records: Arc<Vec<ImageRecord>>,
        num_classes: usize,
        sampler: IndexSampler,
        assembler: Arc<A>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self> {
        ensure!(
            sampler.num_records() == records.len(),
            "the sampler covers {} records, but {} records are given",
            sampler.num_records(),
            records.len()
        );

        Ok(Self {
            records,
            num_classes,
            sampler: Arc::new(Mutex::new(sampler)),
            assembler,
            observer,
        })
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    /// Draw the next indices and assemble the records in index order.
    pub fn next_batch(&self) -> Result<Minibatch<A::Output>> {
        let indices = self.next_indices()?;
        let records: Vec<_> = indices
            .iter()
            .map(|&index| self.records[index].clone())
            .collect();
        let blobs = self.assembler.assemble(&records, self.num_classes)?;
        Ok(Minibatch { indices, blobs })
    }

    fn next_indices(&self) -> Result<Vec<usize>> {
        let mut sampler = self
            .sampler
            .lock()
            .map_err(|_| format_err!("the sampler lock is poisoned"))?;

        let num_shuffles = sampler.num_shuffles();
        let indices = sampler.next_indices();
        if sampler.num_shuffles() != num_shuffles {
            self.observer.on_reshuffle(sampler.num_shuffles());
        }

        Ok(indices)
    }

    /// Endless stream of minibatches that ends after the first error.
    ///
    /// With `prefetch` set, minibatches are assembled on a background task
    /// and buffered up to the given depth. The task is spawned on the first
    /// poll, which must happen inside a tokio runtime, and stops once the
    /// stream is dropped.
    pub fn stream(
        &self,
        prefetch: Option<NonZeroUsize>,
    ) -> Pin<Box<dyn Stream<Item = Result<Minibatch<A::Output>>> + Send>> {
        let stream = match prefetch {
            Some(depth) => self.prefetch_stream(depth).boxed(),
            None => {
                let dispatcher = self.clone();
                stream::repeat_with(move || dispatcher.next_batch()).boxed()
            }
        };

        stream
            .scan(false, |failed, result| {
                if *failed {
                    return future::ready(None);
                }
                *failed = result.is_err();
                future::ready(Some(result))
            })
            .boxed()
    }

    fn prefetch_stream(
        &self,
        depth: NonZeroUsize,
    ) -> impl Stream<Item = Result<Minibatch<A::Output>>> + Send {
        let dispatcher = self.clone();

        stream::unfold(
            None,
            move |rx: Option<mpsc::Receiver<Result<Minibatch<A::Output>>>>| {
                let dispatcher = dispatcher.clone();

                async move {
                    let mut rx = match rx {
                        Some(rx) => rx,
                        None => match dispatcher.spawn_prefetch_worker(depth) {
                            Ok(rx) => rx,
                            Err(err) => return Some((Err(err), None)),
                        },
                    };
                    let item = rx.recv().await?;
                    Some((item, Some(rx)))
                }
            },
        )
    }

    fn spawn_prefetch_worker(
        &self,
        depth: NonZeroUsize,
    ) -> Result<mpsc::Receiver<Result<Minibatch<A::Output>>>> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| format_err!("prefetching requires a tokio runtime"))?;
        let (tx, rx) = mpsc::channel(depth.get());
        let dispatcher = self.clone();

        handle.spawn(async move {
            loop {
                let dispatcher = dispatcher.clone();
                let result = tokio::task::spawn_blocking(move || dispatcher.next_batch())
                    .await
                    .map_err(Error::from)
                    .and_then(|result| result);
                let is_err = result.is_err();

                if tx.send(result).await.is_err() || is_err {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
