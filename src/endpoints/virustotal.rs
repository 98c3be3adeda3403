use super::{Endpoint, EndpointError};

use std::fmt::Display;

use async_trait::async_trait;
use malwaredb_virustotal::VirusTotalClient;

/// VirusTotal, requires a key with download privileges
pub struct VirusTotal {
    client: VirusTotalClient,
}

impl VirusTotal {
    /// VirusTotal endpoint from an API key
    pub fn new(key: String) -> Self {
        Self {
            client: VirusTotalClient::new(key),
        }
    }
}

impl From<VirusTotalClient> for VirusTotal {
    fn from(client: VirusTotalClient) -> Self {
        Self { client }
    }
}

/// The client reports every failure as one error type, a missing sample is
/// only recognizable from the message.
fn download_error<E: Display>(error: E) -> EndpointError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("notfound") || lowered.contains("not found") {
        EndpointError::NotFound
    } else {
        EndpointError::Service(format!("VirusTotal error: {message}"))
    }
}

#[async_trait]
impl Endpoint for VirusTotal {
    fn name(&self) -> &str {
        "VirusTotal"
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError> {
        let contents = self.client.download(hash).await.map_err(download_error)?;
        Ok(contents.to_vec())
    }
}
