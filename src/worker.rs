use crate::endpoints::{Endpoint, EndpointError};
use crate::results::ResultAggregator;

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

/// One hash to download, with its place in the run for progress messages
#[derive(Debug, Clone, Copy)]
pub struct SampleJob<'a> {
    /// Hash of the sample, also used as the output file name
    pub hash: &'a str,

    /// 1-based position of this hash in the run
    pub position: usize,

    /// Number of hashes in the run
    pub total: usize,
}

impl SampleJob<'_> {
    fn progress(&self) -> String {
        format!("({} / {})", self.position, self.total)
    }
}

/// Try each endpoint in order until one provides the sample, write it to
/// `output_dir`, and record the outcome. Never fails: errors are logged and the
/// hash is recorded as missing.
pub async fn download_sample(
    job: SampleJob<'_>,
    endpoints: &[Box<dyn Endpoint>],
    output_dir: &Path,
    results: &ResultAggregator,
) {
    match try_download(job, endpoints, output_dir).await {
        Ok(Some((endpoint, size))) => {
            results.record_download(job.hash, endpoint);
            info!(
                "{} Wrote {size} bytes to {:?} from {endpoint}",
                job.progress(),
                output_dir.join(job.hash)
            );
        }
        Ok(None) => {
            results.record_missing(job.hash).await;
            info!("{} Added \"{}\" to the missing hashes", job.progress(), job.hash);
        }
        Err(e) => {
            results.record_missing(job.hash).await;
            error!(
                "{} An error occurred when downloading {}: {e:#}",
                job.progress(),
                job.hash
            );
        }
    }
}

/// Returns the name of the endpoint which provided the sample and its size,
/// or `None` if no endpoint had it.
async fn try_download<'e>(
    job: SampleJob<'_>,
    endpoints: &'e [Box<dyn Endpoint>],
    output_dir: &Path,
) -> Result<Option<(&'e str, usize)>> {
    let file_path = sample_path(output_dir, job.hash)?;

    for endpoint in endpoints {
        let contents = match endpoint.fetch(job.hash).await {
            Ok(c) => c,
            Err(EndpointError::NotFound) => {
                debug!("{} not found on {}", job.hash, endpoint.name());
                continue;
            }
            Err(e) => {
                warn!("{} failed to query {}: {e}", job.hash, endpoint.name());
                continue;
            }
        };

        if contents.is_empty() {
            debug!("{} returned an empty file for {}", endpoint.name(), job.hash);
            continue;
        }

        tokio::fs::write(&file_path, &contents)
            .await
            .context(format!("failed to write sample to {file_path:?}"))?;

        // Stop here, the remaining endpoints would only cost API quota
        return Ok(Some((endpoint.name(), contents.len())));
    }

    Ok(None)
}

/// Output path for a sample, the hash has to be a plain file name so the
/// sample can't end up outside `output_dir`
fn sample_path(output_dir: &Path, hash: &str) -> Result<PathBuf> {
    let mut components = Path::new(hash).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == OsStr::new(hash) => {
            Ok(output_dir.join(hash))
        }
        _ => bail!("{hash:?} can't be used as a file name"),
    }
}
