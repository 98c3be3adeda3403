use super::archive::extract_first;
use super::{normalize_base, send, Endpoint, EndpointError, ARCHIVE_PASSWORD};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const API_BASE: &str = "https://mb-api.abuse.ch/api/v1";

/// Length of a hex-encoded SHA-256 hash, the only hash type `get_file` accepts
const SHA256_LEN: usize = 64;

/// abuse.ch MalwareBazaar. Samples come back as a ZIP archive with the usual password.
pub struct MalwareBazaar {
    client: Client,
    base: String,
    key: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    query_status: String,
}

#[derive(Deserialize)]
struct InfoResponse {
    query_status: String,
    #[serde(default)]
    data: Vec<InfoEntry>,
}

#[derive(Deserialize)]
struct InfoEntry {
    sha256_hash: String,
}

impl MalwareBazaar {
    /// MalwareBazaar client, the key is sent as `Auth-Key` when it isn't empty
    pub fn new(client: Client, key: Option<String>) -> Self {
        Self::with_base_url(client, key, API_BASE)
    }

    /// MalwareBazaar client for a different API location
    pub fn with_base_url(client: Client, key: Option<String>, base: &str) -> Self {
        Self {
            client,
            base: normalize_base(base),
            key: key.filter(|k| !k.trim().is_empty()),
        }
    }

    async fn query(&self, form: &[(&str, &str)]) -> Result<Vec<u8>, EndpointError> {
        let mut request = self.client.post(format!("{}/", self.base)).form(form);
        if let Some(key) = &self.key {
            request = request.header("Auth-Key", key);
        }
        send(request).await
    }

    /// `get_file` only takes SHA-256, so other hash types are looked up first
    async fn sha256(&self, hash: &str) -> Result<String, EndpointError> {
        if hash.len() == SHA256_LEN {
            return Ok(hash.to_string());
        }

        let body = self.query(&[("query", "get_info"), ("hash", hash)]).await?;
        let info: InfoResponse = serde_json::from_slice(&body)?;
        if info.query_status != "ok" {
            return Err(EndpointError::NotFound);
        }
        info.data
            .into_iter()
            .next()
            .map(|entry| entry.sha256_hash)
            .ok_or(EndpointError::NotFound)
    }
}

#[async_trait]
impl Endpoint for MalwareBazaar {
    fn name(&self) -> &str {
        "MalwareBazaar"
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError> {
        let sha256 = self.sha256(hash).await?;
        let body = self
            .query(&[("query", "get_file"), ("sha256_hash", sha256.as_str())])
            .await?;

        // Errors are reported as JSON with a 200 status
        if !body.starts_with(b"PK") {
            let status: StatusResponse = serde_json::from_slice(&body)?;
            return match status.query_status.as_str() {
                "file_not_found" | "hash_not_found" | "illegal_sha256_hash" | "no_results" => {
                    Err(EndpointError::NotFound)
                }
                other => Err(EndpointError::Service(format!(
                    "MalwareBazaar query status {other}"
                ))),
            };
        }

        extract_first(&body, ARCHIVE_PASSWORD)
    }
}
