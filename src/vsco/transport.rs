//! Transport collaborator: authenticated GET requests and streamed file downloads.
//!
//! The catalog fetcher and the download pool only see the [`Transport`] trait,
//! so tests substitute a stub and the production build plugs in [`HttpTransport`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::vsco::error::{VscoError, VscoResult};

/// Extension of in-progress downloads
pub(crate) const PART_EXTENSION: &str = "part";

/// A fully buffered response. The body is already content-decoded.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> VscoResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Abstraction over the HTTP client, enabling testability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Authenticated GET. Non-success statuses are returned, not raised.
    async fn get(&self, url: &str) -> VscoResult<TransportResponse>;

    /// GET `url` and write the whole body to `path`, returning the byte count.
    /// A non-success status is an error and leaves no file behind.
    async fn download_to(&self, url: &str, path: &Path) -> VscoResult<u64>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    /// Sent as `Authorization: Bearer <token>` when present
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:141.0) Gecko/20100101 Firefox/141.0"
                .to_string(),
            auth_token: Some("7356455548d0a1d886db010883388d08be84d0c9".to_string()),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Production [`Transport`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> VscoResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| VscoError::transport("client setup", e))?;
            headers.insert(AUTHORIZATION, value);
        }

        // gzip, brotli and deflate bodies are decoded by reqwest itself
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(30))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| VscoError::transport("client setup", e))?;

        debug!(
            timeout_secs = config.timeout_secs,
            authenticated = config.auth_token.is_some(),
            "Initialized HTTP transport"
        );

        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> VscoResult<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| VscoError::transport(url, e))
    }

    /// Stream a response to a file
    async fn stream_to_file(url: &str, response: reqwest::Response, path: &Path) -> VscoResult<u64> {
        let mut file = File::create(path)
            .await
            .map_err(|e| VscoError::filesystem(path, e))?;

        let mut stream = response.bytes_stream();
        let mut bytes_written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| VscoError::transport(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| VscoError::filesystem(path, e))?;
            bytes_written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| VscoError::filesystem(path, e))?;
        Ok(bytes_written)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> VscoResult<TransportResponse> {
        let response = self.send(url).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| VscoError::transport(url, e))?;

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    async fn download_to(&self, url: &str, path: &Path) -> VscoResult<u64> {
        let response = self.send(url).await?;
        if !response.status().is_success() {
            return Err(VscoError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let partial = partial_path(path);
        match Self::stream_to_file(url, response, &partial).await {
            Ok(bytes) => {
                fs::rename(&partial, path)
                    .await
                    .map_err(|e| VscoError::filesystem(path, e))?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    warn!("Failed to remove partial file {}: {}", partial.display(), cleanup);
                }
                Err(e)
            }
        }
    }
}

/// `photo.jpg` -> `photo.jpg.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(PART_EXTENSION);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(&TransportConfig {
            auth_token: Some("secret".to_string()),
            ..TransportConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/sites"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"sites":[]}"#))
            .mount(&server)
            .await;

        let response = transport()
            .get(&format!("{}/api/2.0/sites", server.uri()))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.body, br#"{"sites":[]}"#.to_vec());
    }

    #[tokio::test]
    async fn test_get_returns_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = transport().get(&server.uri()).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_to_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.jpg");
        let bytes = transport()
            .download_to(&format!("{}/a.jpg", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(bytes, 4);
        assert_eq!(std::fs::read(&target).unwrap(), vec![1u8, 2, 3, 4]);
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_download_to_rejects_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.jpg");
        let err = transport()
            .download_to(&format!("{}/a.jpg", server.uri()), &target)
            .await
            .unwrap_err();

        assert!(matches!(err, VscoError::Status { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/u/123.jpg")),
            PathBuf::from("/tmp/u/123.jpg.part")
        );
    }
}
