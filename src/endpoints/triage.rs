use super::{normalize_base, send, Endpoint, EndpointError};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const API_BASE: &str = "https://api.tria.ge/v0";

/// Hatching Triage sandbox, samples are found by search then downloaded by sample ID
pub struct Triage {
    client: Client,
    base: String,
    key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
}

impl Triage {
    /// Triage client for the public API
    pub fn new(client: Client, key: String) -> Self {
        Self::with_base_url(client, key, API_BASE)
    }

    /// Triage client for a different API location, such as a private instance
    pub fn with_base_url(client: Client, key: String, base: &str) -> Self {
        Self {
            client,
            base: normalize_base(base),
            key,
        }
    }

    async fn sample_id(&self, hash: &str) -> Result<String, EndpointError> {
        let request = self
            .client
            .get(format!("{}/search", self.base))
            .query(&[("query", hash)])
            .bearer_auth(&self.key);
        let body = send(request).await?;
        let results: SearchResponse = serde_json::from_slice(&body)?;

        results
            .data
            .into_iter()
            .next()
            .map(|hit| hit.id)
            .ok_or(EndpointError::NotFound)
    }
}

#[async_trait]
impl Endpoint for Triage {
    fn name(&self) -> &str {
        "Triage"
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError> {
        let id = self.sample_id(hash).await?;
        let request = self
            .client
            .get(format!("{}/samples/{id}/sample", self.base))
            .bearer_auth(&self.key);
        send(request).await
    }
}
