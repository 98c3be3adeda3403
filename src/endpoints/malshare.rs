use super::{normalize_base, send, Endpoint, EndpointError};

use async_trait::async_trait;
use reqwest::Client;

const API_BASE: &str = "https://malshare.com";

/// Body MalShare returns, sometimes with a 200 status, for unknown hashes
const NOT_FOUND_MARKER: &[u8] = b"Sample not found by hash";

/// MalShare
pub struct MalShare {
    client: Client,
    base: String,
    key: String,
}

impl MalShare {
    /// MalShare client for the public API
    pub fn new(client: Client, key: String) -> Self {
        Self::with_base_url(client, key, API_BASE)
    }

    /// MalShare client for a different API location
    pub fn with_base_url(client: Client, key: String, base: &str) -> Self {
        Self {
            client,
            base: normalize_base(base),
            key,
        }
    }
}

#[async_trait]
impl Endpoint for MalShare {
    fn name(&self) -> &str {
        "MalShare"
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError> {
        let request = self
            .client
            .get(format!("{}/api.php", self.base))
            .query(&[
                ("api_key", self.key.as_str()),
                ("action", "getfile"),
                ("hash", hash),
            ]);
        let body = send(request).await?;

        if body
            .windows(NOT_FOUND_MARKER.len())
            .any(|w| w == NOT_FOUND_MARKER)
        {
            return Err(EndpointError::NotFound);
        }
        Ok(body)
    }
}
