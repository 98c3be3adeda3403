#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(clippy::all)]
//#![deny(clippy::cargo)]

/// Configuration file parsing and validation
pub mod config;

pub mod endpoints;

/// Thread-safe collection of download outcomes
pub mod results;

/// Download of a single hash across the configured endpoints
pub mod worker;

use endpoints::Endpoint;
use results::{FetchResult, ResultAggregator};
use worker::{download_sample, SampleJob};

use std::cmp::{max, min};
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Constructed version of samplefetch
pub const VERSION: &str = concat!(
    "v",
    env!("CARGO_PKG_VERSION"),
    "-",
    env!("VERGEN_GIT_DESCRIBE"),
    " ",
    env!("VERGEN_BUILD_DATE")
);

/// Problems which prevent a run from starting
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The set of hashes is empty
    #[error("no hashes were provided")]
    NoHashes,

    /// None of the endpoints are enabled
    #[error("no endpoints are enabled, provide at least one API key")]
    NoEndpoints,
}

/// Downloads samples by hash from an ordered list of endpoints with a bounded
/// number of concurrent workers.
pub struct SampleFetcher {
    /// Directory the samples are written to, must already exist
    pub output_dir: PathBuf,

    /// Endpoints in the order they are tried
    endpoints: Arc<Vec<Box<dyn Endpoint>>>,

    /// Number of concurrent workers, at least one
    pub threads: usize,
}

impl SampleFetcher {
    /// Create the fetcher. Thread counts of zero or lower are treated as one.
    pub fn new(output_dir: PathBuf, endpoints: Vec<Box<dyn Endpoint>>, threads: i64) -> Self {
        let threads = usize::try_from(max(threads, 1)).unwrap_or(usize::MAX);
        Self {
            output_dir,
            endpoints: Arc::new(endpoints),
            threads,
        }
    }

    /// Names of the enabled endpoints, in the order they are tried
    pub fn platforms(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.name()).collect()
    }

    /// Download every hash, returning once all of them have either been
    /// written to the output directory or recorded as missing.
    ///
    /// Completion order across hashes is unspecified, so progress messages
    /// may be logged out of sequence.
    pub async fn run(&self, hashes: &HashSet<String>) -> Result<FetchResult, FetchError> {
        if hashes.is_empty() {
            return Err(FetchError::NoHashes);
        }
        if self.endpoints.is_empty() {
            return Err(FetchError::NoEndpoints);
        }

        let start = Utc::now();
        let mut ordered: Vec<String> = hashes.iter().cloned().collect();
        ordered.sort_unstable();
        let hashes = Arc::new(ordered);
        let total = hashes.len();
        let threads = min(self.threads, total);

        let results = Arc::new(ResultAggregator::default());
        let output_dir = Arc::new(self.output_dir.clone());
        let hash_counter = Arc::new(AtomicUsize::default());
        let mut thread_handles = Vec::with_capacity(threads);

        for _ in 0..threads {
            let local_counter = hash_counter.clone();
            let local_hashes = hashes.clone();
            let local_endpoints = self.endpoints.clone();
            let local_output_dir = output_dir.clone();
            let local_results = results.clone();
            let handle = tokio::spawn(async move {
                loop {
                    let current_index = local_counter.fetch_add(1, Ordering::Relaxed);
                    let hash = if let Some(h) = local_hashes.get(current_index) {
                        h.clone()
                    } else {
                        break;
                    };

                    // Each hash gets its own task, a panic ends that hash but not the worker
                    let task_hash = hash.clone();
                    let task_endpoints = local_endpoints.clone();
                    let task_output_dir = local_output_dir.clone();
                    let task_results = local_results.clone();
                    let task = tokio::spawn(async move {
                        let job = SampleJob {
                            hash: &task_hash,
                            position: current_index + 1,
                            total,
                        };
                        download_sample(job, &task_endpoints, &task_output_dir, &task_results)
                            .await;
                    });

                    if let Err(e) = task.await {
                        error!(
                            "({} / {total}) Download of {hash} stopped unexpectedly: {e}",
                            current_index + 1
                        );
                        local_results.record_missing(&hash).await;
                    }
                }
            });
            thread_handles.push(handle);
        }

        for handle in thread_handles {
            if let Err(e) = handle.await {
                error!("Download worker stopped unexpectedly: {e}");
            }
        }

        let elapsed = Utc::now() - start;
        let mut result = match Arc::try_unwrap(results) {
            Ok(results) => results.finish(elapsed),
            Err(shared) => {
                warn!("Results are still shared after every worker finished, copying them");
                shared.snapshot(elapsed).await
            }
        };

        // A worker which stopped early may have left its hash without an outcome
        let recorded_missing: HashSet<&String> = result.missing.iter().collect();
        let unaccounted: Vec<String> = hashes
            .iter()
            .filter(|h| !result.downloaded.contains_key(*h) && !recorded_missing.contains(h))
            .cloned()
            .collect();
        for hash in unaccounted {
            warn!("No outcome was recorded for {hash}, adding it to the missing hashes");
            result.missing.push(hash);
        }

        info!(
            "Finished {} hashes: {} downloaded, {} missing in {}",
            total,
            result.downloaded.len(),
            result.missing.len(),
            result.elapsed_display()
        );
        Ok(result)
    }
}

impl Debug for SampleFetcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "output_dir: {:?}, endpoints: {:?}, threads: {}",
            self.output_dir,
            self.platforms(),
            self.threads
        )
    }
}
