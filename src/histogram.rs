//! Downsampled feature-density tracks.
//!
//! A histogram divides a chromosome into at most [`HISTOGRAM_SIZE_LIMIT`]
//! fixed-width buckets and records a feature density per bucket. Tracks
//! are computed once, concurrently over a process-wide worker pool, and
//! persisted through the [`FileStore`]; later requests load the stored
//! track instead of recomputing.

use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::store::FileStore;
use crate::types::{Chromosome, FeatureFile, HistogramBucket};
use crate::{Error, Result};

/// Buckets per base: a 100 Mb chromosome gets 2500 buckets before clamping
pub const HISTOGRAM_BLOCK_SIZE_PART: f64 = 2.5e-5;

/// Hard cap on buckets per track
pub const HISTOGRAM_SIZE_LIMIT: u64 = 1000;

/// Number of buckets for a chromosome of `size` bases
pub fn bucket_count(size: u64) -> u64 {
    let raw = (size as f64 * HISTOGRAM_BLOCK_SIZE_PART).ceil() as u64;
    raw.clamp(1, HISTOGRAM_SIZE_LIMIT)
}

/// Bucket boundaries covering `[1, size]`, 1-based inclusive, contiguous
pub fn histogram_intervals(size: u64) -> Vec<(u64, u64)> {
    if size == 0 {
        return Vec::new();
    }
    let buckets = bucket_count(size);
    let width = size.div_ceil(buckets);
    let mut intervals = Vec::with_capacity(buckets as usize);
    let mut start = 1u64;
    while start <= size {
        let end = (start + width - 1).min(size);
        intervals.push((start, end));
        start = end + 1;
    }
    intervals
}

/// Splits `len` items into at most `parts` contiguous ranges; the last
/// range absorbs the remainder.
pub fn partition_ranges(len: usize, parts: usize) -> Vec<std::ops::Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, len);
    let base = len / parts;
    let mut ranges = Vec::with_capacity(parts);
    for i in 0..parts {
        let start = i * base;
        let end = if i == parts - 1 { len } else { start + base };
        ranges.push(start..end);
    }
    ranges
}

static WORKER_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// Builds the process-wide histogram worker pool. Later calls are no-ops;
/// the pool is never torn down or lazily recreated.
pub fn init_worker_pool(threads: usize) -> Result<()> {
    if WORKER_POOL.get().is_some() {
        return Ok(());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("histogram-{i}"))
        .build()
        .map_err(|e| Error::Histogram(e.to_string()))?;
    let _ = WORKER_POOL.set(pool);
    Ok(())
}

fn worker_pool() -> Result<&'static ThreadPool> {
    WORKER_POOL
        .get()
        .ok_or_else(|| Error::Internal("histogram worker pool not initialized".to_string()))
}

/// Computes bucket values for one contiguous slice of a track's intervals.
/// Runs on worker threads; implementations must be self-contained. The
/// lifetime lets callers pass closures borrowing local state.
pub type ComputeFn<'a> =
    dyn Fn(&FeatureFile, &Chromosome, &[(u64, u64)]) -> Result<Vec<HistogramBucket>> + Sync + 'a;

pub struct HistogramEngine {
    file_store: Arc<dyn FileStore>,
}

impl HistogramEngine {
    pub fn new(file_store: Arc<dyn FileStore>) -> Self {
        HistogramEngine { file_store }
    }

    /// Returns the persisted track if one exists; otherwise computes it
    /// over the worker pool, persists it, and returns it.
    ///
    /// Interval slices are assigned to workers in order and the partial
    /// tracks are reassembled in partition order, so the result is
    /// deterministic regardless of worker scheduling. Any failing
    /// partition fails the whole build and nothing is persisted.
    pub fn load_or_build(
        &self,
        file: &FeatureFile,
        chromosome: &Chromosome,
        compute: &ComputeFn<'_>,
    ) -> Result<Vec<HistogramBucket>> {
        if self.file_store.histogram_exists(file, &chromosome.name) {
            return self.file_store.load_histogram(file, &chromosome.name);
        }

        let pool = worker_pool()?;
        let intervals = histogram_intervals(chromosome.size);
        let ranges = partition_ranges(intervals.len(), pool.current_num_threads());

        tracing::debug!(
            file = file.id,
            chromosome = %chromosome.name,
            buckets = intervals.len(),
            partitions = ranges.len(),
            "building histogram track"
        );

        let partials: Vec<Vec<HistogramBucket>> = pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| compute(file, chromosome, &intervals[range]))
                .collect::<Result<Vec<_>>>()
        })?;

        let buckets: Vec<HistogramBucket> = partials.into_iter().flatten().collect();
        self.file_store
            .persist_histogram(file, &chromosome.name, &buckets)?;
        Ok(buckets)
    }
}
