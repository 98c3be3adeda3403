use super::{normalize_base, send, Endpoint, EndpointError};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const API_BASE: &str = "https://koodous.com/api";

/// Koodous, an Android (APK) repository
pub struct Koodous {
    client: Client,
    base: String,
    key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    results: Vec<Apk>,
}

#[derive(Deserialize)]
struct Apk {
    sha256: String,
}

#[derive(Deserialize)]
struct DownloadResponse {
    download_url: String,
}

impl Koodous {
    /// Koodous client for the public API
    pub fn new(client: Client, key: String) -> Self {
        Self::with_base_url(client, key, API_BASE)
    }

    /// Koodous client for a different API location
    pub fn with_base_url(client: Client, key: String, base: &str) -> Self {
        Self {
            client,
            base: normalize_base(base),
            key,
        }
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.key)
    }

    /// Search accepts any hash type, downloads need the SHA-256
    async fn sha256(&self, hash: &str) -> Result<String, EndpointError> {
        let request = self
            .client
            .get(format!("{}/apks", self.base))
            .query(&[("search", hash), ("page", "1"), ("page_size", "100")])
            .header("Authorization", self.authorization());
        let body = send(request).await?;
        let search: SearchResponse = serde_json::from_slice(&body)?;

        if search.count == 0 {
            return Err(EndpointError::NotFound);
        }
        search
            .results
            .into_iter()
            .next()
            .map(|apk| apk.sha256)
            .ok_or(EndpointError::NotFound)
    }
}

#[async_trait]
impl Endpoint for Koodous {
    fn name(&self) -> &str {
        "Koodous"
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError> {
        let sha256 = self.sha256(hash).await?;

        let request = self
            .client
            .get(format!("{}/apks/{sha256}/download", self.base))
            .header("Authorization", self.authorization());
        let body = send(request).await?;
        let link: DownloadResponse = serde_json::from_slice(&body)?;

        let request = self
            .client
            .get(link.download_url)
            .header("Authorization", self.authorization());
        send(request).await
    }
}
