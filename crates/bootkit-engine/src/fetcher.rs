//! HTTP(S) retrieval of manifests and item payloads

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{redirect, Client, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Redirect hops allowed when following is enabled
const MAX_REDIRECTS: usize = 10;

/// Errors raised while fetching a remote artifact
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid authorization header: {0}")]
    InvalidHeader(String),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash mismatch for {}: expected {expected}, got {actual}", .path.display())]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::InvalidUrl { .. } | FetchError::InvalidHeader(_)
        )
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parameters of a single fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub follow_redirects: bool,
    pub auth_header: Option<String>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            follow_redirects: false,
            auth_header: None,
            timeout,
        }
    }

    pub fn with_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_auth_header(mut self, header: Option<String>) -> Self {
        self.auth_header = header.filter(|h| !h.trim().is_empty());
        self
    }
}

/// Retrieves remote artifacts
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch a payload into memory, used for manifests
    async fn fetch_bytes(&self, request: &FetchRequest) -> Result<Bytes, FetchError>;

    /// Stream a payload to `destination`, creating its parent directory
    ///
    /// Returns the number of bytes written. The file is complete and
    /// flushed when this returns `Ok`.
    async fn fetch_to_file(
        &self,
        request: &FetchRequest,
        destination: &Path,
    ) -> Result<u64, FetchError>;
}

/// `reqwest`-backed fetcher
pub struct HttpFetcher {
    direct: Client,
    following: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let user_agent = format!("bootkit/{}", bootkit_core::VERSION);
        let direct = Client::builder()
            .user_agent(&user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;
        let following = Client::builder()
            .user_agent(&user_agent)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { direct, following })
    }

    fn client(&self, follow_redirects: bool) -> &Client {
        if follow_redirects {
            &self.following
        } else {
            &self.direct
        }
    }

    async fn send(&self, request: &FetchRequest) -> Result<reqwest::Response, FetchError> {
        let url = parse_url(&request.url)?;
        let mut builder = self.client(request.follow_redirects).get(url);

        if let Some(header) = &request.auth_header {
            let value = HeaderValue::from_str(header)
                .map_err(|e| FetchError::InvalidHeader(e.to_string()))?;
            builder = builder.header(AUTHORIZATION, value);
        }

        let response = builder.send().await.map_err(|e| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn download(&self, request: &FetchRequest, destination: &Path) -> Result<u64, FetchError> {
        let response = self.send(request).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| FetchError::io(destination, e))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Transport {
                url: request.url.clone(),
                message: e.to_string(),
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(destination, e))?;
            written += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| FetchError::io(destination, e))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::io(destination, e))?;

        Ok(written)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch_bytes(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        debug!("Fetching {}", request.url);
        let fetch = async {
            let response = self.send(request).await?;
            response.bytes().await.map_err(|e| FetchError::Transport {
                url: request.url.clone(),
                message: e.to_string(),
            })
        };

        tokio::time::timeout(request.timeout, fetch)
            .await
            .map_err(|_| FetchError::Timeout {
                url: request.url.clone(),
                timeout: request.timeout,
            })?
    }

    async fn fetch_to_file(
        &self,
        request: &FetchRequest,
        destination: &Path,
    ) -> Result<u64, FetchError> {
        debug!("Downloading {} to {}", request.url, destination.display());
        let written = tokio::time::timeout(request.timeout, self.download(request, destination))
            .await
            .map_err(|_| FetchError::Timeout {
                url: request.url.clone(),
                timeout: request.timeout,
            })??;
        debug!("Wrote {} bytes to {}", written, destination.display());
        Ok(written)
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
