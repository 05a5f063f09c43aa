//! Train/validation split and batch loading with optional prefetch.
//!
//! A [`BatchLoader`] owns a row-index set and yields [`ResolvedBatch`]es in
//! order. With `num_workers > 0`, resolution runs on background threads; each
//! worker handles every `num_workers`-th batch and feeds its own bounded
//! channel, and the consumer reads the channels round-robin so batch order is
//! unchanged.

use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use rand::seq::SliceRandom;
use rand::Rng;
use tabular::{BatchResolver, ResolveError, ResolvedBatch, TabularDataset};

/// Batches each prefetch worker may resolve ahead of the consumer.
const PREFETCH_PER_WORKER: usize = 2;

/// Row indices assigned to training and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSplit {
    pub train: Vec<usize>,
    /// Sorted. Empty when `valid_split` is 0 or rounds down to no rows.
    pub valid: Vec<usize>,
}

/// Hold out `floor(n_rows * valid_split)` rows, chosen uniformly at random.
pub fn split_indices<R: Rng + ?Sized>(n_rows: usize, valid_split: f64, rng: &mut R) -> DataSplit {
    let n_valid = if valid_split > 0.0 {
        ((n_rows as f64 * valid_split).floor() as usize).min(n_rows)
    } else {
        0
    };
    let mut valid = rand::seq::index::sample(rng, n_rows, n_valid).into_vec();
    valid.sort_unstable();

    let mut held_out = vec![false; n_rows];
    for &i in &valid {
        held_out[i] = true;
    }
    let train = (0..n_rows).filter(|&i| !held_out[i]).collect();
    DataSplit { train, valid }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Reshuffle row order at the start of every epoch.
    pub shuffle: bool,
    /// Drop a trailing batch smaller than `batch_size`.
    pub drop_last: bool,
    /// Background resolution threads. 0 resolves inline.
    pub num_workers: usize,
}

impl LoaderOptions {
    pub fn training(batch_size: usize, drop_last: bool, num_workers: usize) -> Self {
        Self {
            batch_size,
            shuffle: true,
            drop_last,
            num_workers,
        }
    }

    /// Validation batches: fixed order, nothing dropped.
    pub fn validation(batch_size: usize, num_workers: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            drop_last: false,
            num_workers,
        }
    }
}

/// Yields resolved batches over a fixed set of dataset rows.
pub struct BatchLoader {
    dataset: Arc<TabularDataset>,
    rows: Vec<usize>,
    resolver: Arc<dyn BatchResolver>,
    options: LoaderOptions,
}

impl BatchLoader {
    /// # Panics
    /// Panics if `options.batch_size` is 0.
    pub fn new(
        dataset: Arc<TabularDataset>,
        rows: Vec<usize>,
        resolver: Arc<dyn BatchResolver>,
        options: LoaderOptions,
    ) -> Self {
        assert!(options.batch_size > 0, "batch_size must be > 0");
        Self {
            dataset,
            rows,
            resolver,
            options,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_batches(&self) -> usize {
        let n = self.rows.len();
        let b = self.options.batch_size;
        if self.options.drop_last {
            n / b
        } else {
            n.div_ceil(b)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_batches() == 0
    }

    fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Vec<usize>> {
        let mut order = self.rows.clone();
        if self.options.shuffle {
            order.shuffle(rng);
        }
        let mut chunks: Vec<Vec<usize>> = order
            .chunks(self.options.batch_size)
            .map(<[usize]>::to_vec)
            .collect();
        if self.options.drop_last && chunks.last().is_some_and(|c| c.len() < self.options.batch_size) {
            chunks.pop();
        }
        chunks
    }

    /// Start one pass over the rows.
    pub fn epoch<R: Rng + ?Sized>(&self, rng: &mut R) -> EpochBatches {
        let chunks = self.plan(rng);
        if self.options.num_workers == 0 || chunks.len() <= 1 {
            return EpochBatches::Inline {
                dataset: Arc::clone(&self.dataset),
                resolver: Arc::clone(&self.resolver),
                chunks: chunks.into_iter(),
            };
        }
        EpochBatches::Prefetch(Prefetch::spawn(
            Arc::clone(&self.dataset),
            Arc::clone(&self.resolver),
            chunks,
            self.options.num_workers,
        ))
    }
}

/// Iterator over one epoch's batches, in plan order.
pub enum EpochBatches {
    Inline {
        dataset: Arc<TabularDataset>,
        resolver: Arc<dyn BatchResolver>,
        chunks: std::vec::IntoIter<Vec<usize>>,
    },
    Prefetch(Prefetch),
}

impl Iterator for EpochBatches {
    type Item = Result<ResolvedBatch, ResolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Inline {
                dataset,
                resolver,
                chunks,
            } => chunks.next().map(|rows| resolver.resolve(dataset, &rows)),
            Self::Prefetch(prefetch) => prefetch.next(),
        }
    }
}

/// Background workers resolving batches ahead of the consumer.
///
/// Dropping it closes the channels, which unblocks and ends every worker.
pub struct Prefetch {
    receivers: Vec<Receiver<Result<ResolvedBatch, ResolveError>>>,
    workers: Vec<JoinHandle<()>>,
    next: usize,
    remaining: usize,
}

impl Prefetch {
    fn spawn(
        dataset: Arc<TabularDataset>,
        resolver: Arc<dyn BatchResolver>,
        chunks: Vec<Vec<usize>>,
        num_workers: usize,
    ) -> Self {
        let n_workers = num_workers.min(chunks.len());
        let remaining = chunks.len();

        let mut assigned: Vec<Vec<Vec<usize>>> = vec![Vec::new(); n_workers];
        for (i, chunk) in chunks.into_iter().enumerate() {
            assigned[i % n_workers].push(chunk);
        }

        let mut receivers = Vec::with_capacity(n_workers);
        let mut workers = Vec::with_capacity(n_workers);
        for (worker_id, batches) in assigned.into_iter().enumerate() {
            let (tx, rx) = sync_channel(PREFETCH_PER_WORKER);
            let dataset = Arc::clone(&dataset);
            let resolver = Arc::clone(&resolver);
            let handle = std::thread::spawn(move || {
                for rows in batches {
                    if tx.send(resolver.resolve(&dataset, &rows)).is_err() {
                        tracing::trace!(worker_id, "Prefetch consumer gone, stopping");
                        return;
                    }
                }
            });
            receivers.push(rx);
            workers.push(handle);
        }

        Self {
            receivers,
            workers,
            next: 0,
            remaining,
        }
    }

    fn next(&mut self) -> Option<Result<ResolvedBatch, ResolveError>> {
        if self.remaining == 0 {
            return None;
        }
        let rx = &self.receivers[self.next % self.receivers.len()];
        self.next += 1;
        self.remaining -= 1;
        match rx.recv() {
            Ok(batch) => Some(batch),
            Err(_) => {
                // Worker died before sending; nothing more can be delivered in order
                self.remaining = 0;
                Some(Err(ResolveError::Malformed("prefetch worker stopped unexpectedly".into())))
            }
        }
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        self.receivers.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
