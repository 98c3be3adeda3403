use super::archive::extract_first;
use super::{normalize_base, send, Endpoint, EndpointError, ARCHIVE_PASSWORD};

use async_trait::async_trait;
use reqwest::Client;

const API_BASE: &str = "https://virusshare.com/apiv2";

/// VirusShare. Samples are served inside a password protected ZIP archive.
pub struct VirusShare {
    client: Client,
    base: String,
    key: String,
}

impl VirusShare {
    /// VirusShare client for the public API
    pub fn new(client: Client, key: String) -> Self {
        Self::with_base_url(client, key, API_BASE)
    }

    /// VirusShare client for a different API location
    pub fn with_base_url(client: Client, key: String, base: &str) -> Self {
        Self {
            client,
            base: normalize_base(base),
            key,
        }
    }
}

#[async_trait]
impl Endpoint for VirusShare {
    fn name(&self) -> &str {
        "VirusShare"
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError> {
        if hash.trim().is_empty() {
            return Err(EndpointError::NotFound);
        }

        let request = self
            .client
            .get(format!("{}/download", self.base))
            .query(&[("apikey", self.key.as_str()), ("hash", hash)]);
        let body = send(request).await?;

        // VirusShare answers unknown hashes with 204 and no content
        if body.is_empty() {
            return Err(EndpointError::NotFound);
        }
        extract_first(&body, ARCHIVE_PASSWORD)
    }
}
