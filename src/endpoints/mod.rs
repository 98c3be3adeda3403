//! Malware repositories a sample can be fetched from.
//!
//! Each repository implements [Endpoint]. The fetcher only ever sees a list of
//! `Box<dyn Endpoint>`, tried in order for every hash.

mod archive;
mod koodous;
mod malshare;
mod malware_bazaar;
mod triage;
mod virusshare;
mod virustotal;

pub use koodous::Koodous;
pub use malshare::MalShare;
pub use malware_bazaar::MalwareBazaar;
pub use triage::Triage;
pub use virusshare::VirusShare;
pub use virustotal::VirusTotal;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use thiserror::Error;

/// Password used by the repositories which serve samples inside a ZIP archive
pub const ARCHIVE_PASSWORD: &[u8] = b"infected";

/// Reasons an endpoint could not provide a sample
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The repository does not have the sample
    #[error("sample not found")]
    NotFound,

    /// The repository refused the request due to quota or rate limits
    #[error("rate limited by the service")]
    RateLimited,

    /// Unexpected HTTP status code
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    /// Connection, timeout, or other transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned JSON which could not be understood
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The sample archive could not be opened
    #[error("failed to extract sample archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Reading the sample out of the archive failed
    #[error("failed to read sample: {0}")]
    Io(#[from] std::io::Error),

    /// Any other service-specific failure
    #[error("{0}")]
    Service(String),
}

/// A malware repository which can provide samples by hash
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Display name, used for reporting which endpoint provided a sample
    fn name(&self) -> &str;

    /// Download the sample with the given MD5, SHA-1, or SHA-256 hash.
    ///
    /// Returns [EndpointError::NotFound] when the repository doesn't have it.
    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, EndpointError>;
}

/// Build the HTTP client shared by the endpoints, with a total per-request timeout
pub fn http_client(timeout: Duration) -> Result<Client, EndpointError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("samplefetch/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Send the request and return the body, mapping the status codes the
/// repositories use for "no such sample" and quota exhaustion.
pub(crate) async fn send(request: RequestBuilder) -> Result<Vec<u8>, EndpointError> {
    let response = request.send().await?;
    match response.status() {
        s if s.is_success() => Ok(response.bytes().await?.to_vec()),
        StatusCode::NOT_FOUND => Err(EndpointError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => Err(EndpointError::RateLimited),
        s => Err(EndpointError::Status(s)),
    }
}

/// Strip the trailing slash so paths can be appended with `format!`
pub(crate) fn normalize_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn base_without_trailing_slash() {
        assert_eq!(normalize_base("https://api.tria.ge/v0/"), "https://api.tria.ge/v0");
        assert_eq!(normalize_base("http://127.0.0.1:80"), "http://127.0.0.1:80");
    }

    #[tokio::test]
    async fn status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quota"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MZ".to_vec()))
            .mount(&server)
            .await;

        let client = http_client(Duration::from_secs(10)).unwrap();
        let get = |p: &str| client.get(format!("{}{p}", server.uri()));

        assert!(matches!(send(get("/missing")).await, Err(EndpointError::NotFound)));
        assert!(matches!(send(get("/quota")).await, Err(EndpointError::RateLimited)));
        assert!(matches!(
            send(get("/broken")).await,
            Err(EndpointError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
        assert_eq!(send(get("/ok")).await.unwrap(), b"MZ");
    }
}
