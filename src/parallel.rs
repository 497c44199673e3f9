// SPDX-License-Identifier: Apache-2.0

//! Wire coverage over a sample stream using several worker threads.
//!
//! The stream is read in batches on the calling thread. Each batch is split
//! into contiguous chunks, one per worker; every worker owns an evaluator
//! and a coverage accumulator. Coverage updates are bitwise ORs, so merging
//! the per-worker accumulators at the end gives the same result as a single
//! sequential pass.

use crate::expr::ExprModel;
use crate::fraction::Fraction;
use crate::metric::{ManualMetric, Metric, MetricError, MetricOptions, SatisfiedCounts};
use crate::sample::{Sample, SampleParseError};
use crate::wire_coverage::CoverageAccumulator;

pub const DEFAULT_BATCH_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct ParallelOutcome {
    pub coverage: CoverageAccumulator,
    pub counts: SatisfiedCounts,
}

impl ParallelOutcome {
    pub fn coverage_result(&self) -> Result<Fraction, MetricError> {
        self.coverage.result()
    }

    pub fn satisfaction_result(&self) -> Result<Fraction, MetricError> {
        self.counts.fraction()
    }
}

pub struct ParallelCoverageRunner<'a> {
    model: &'a ExprModel,
    options: MetricOptions,
    threads: usize,
    batch_size: usize,
}

impl<'a> ParallelCoverageRunner<'a> {
    pub fn new(model: &'a ExprModel, options: MetricOptions) -> Self {
        Self {
            model,
            options,
            threads: num_cpus::get(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Drains `samples` (at most `max_samples` of them). A stream error stops
    /// the run before the batch it was found in is evaluated.
    pub fn run<I>(&self, samples: I, max_samples: Option<u64>) -> Result<ParallelOutcome, MetricError>
    where
        I: IntoIterator<Item = Result<Sample, SampleParseError>>,
    {
        // Workers log nothing; progress is reported per batch below.
        let worker_options = MetricOptions {
            progress_every: 0,
            ..self.options
        };
        let mut workers: Vec<ManualMetric> = (0..self.threads)
            .map(|_| ManualMetric::with_coverage(self.model, worker_options))
            .collect();
        log::info!(
            "parallel coverage: threads={} batch_size={}",
            self.threads,
            self.batch_size
        );

        let mut samples = samples.into_iter();
        let mut read = 0u64;
        let mut last_progress = 0u64;
        let mut batch: Vec<Sample> = Vec::with_capacity(self.batch_size);
        loop {
            batch.clear();
            while batch.len() < self.batch_size && max_samples.map_or(true, |max| read < max) {
                match samples.next() {
                    Some(sample) => batch.push(sample?),
                    None => break,
                }
                read += 1;
            }
            if batch.is_empty() {
                break;
            }
            self.run_batch(&mut workers, &batch)?;

            if self.options.progress_every != 0 {
                let counts = merged_counts(&workers);
                if counts.samples / self.options.progress_every
                    > last_progress / self.options.progress_every
                {
                    log::info!("{}/{}", counts.satisfied, counts.samples);
                }
                last_progress = counts.samples;
            }
        }

        let mut coverage = CoverageAccumulator::new();
        for worker in &workers {
            if let Some(worker_coverage) = worker.coverage() {
                coverage.merge(worker_coverage);
            }
        }
        Ok(ParallelOutcome {
            coverage,
            counts: merged_counts(&workers),
        })
    }

    fn run_batch(&self, workers: &mut [ManualMetric], batch: &[Sample]) -> Result<(), MetricError> {
        let chunk_size = batch.len().div_ceil(workers.len());
        let results: Vec<Result<(), MetricError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = workers
                .iter_mut()
                .zip(batch.chunks(chunk_size))
                .map(|(worker, chunk)| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .try_for_each(|sample| worker.count_sample(sample))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });
        // Chunks are in stream order, so this is the earliest failing sample.
        results.into_iter().collect()
    }
}

fn merged_counts(workers: &[ManualMetric]) -> SatisfiedCounts {
    let mut counts = SatisfiedCounts::default();
    for worker in workers {
        counts.merge(&worker.counts());
    }
    counts
}
