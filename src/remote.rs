// Remote object source: plain GETs against an exposed repository directory.
//
// <root>/objects/<hash[0:2]>/<hash[2:]>  -> zlib-compressed loose object
// <root>/HEAD, <root>/refs/..., <root>/packed-refs -> ref files (see refs.rs)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use salvage_protocol::ObjectHash;
use tracing::warn;

use crate::config::Config;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure, timeout, or a server-side status worth retrying.
    #[error("network error fetching {path}: {message}")]
    Network { path: String, message: String },

    #[error("unexpected HTTP status {status} fetching {path}")]
    Status { path: String, status: u16 },
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network { .. })
    }
}

/// Read-only access to a remote repository directory.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch a file by its path relative to the repository root, e.g. `HEAD`.
    async fn fetch_path(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Fetch the compressed bytes of one loose object.
    async fn fetch(&self, hash: &ObjectHash) -> Result<Vec<u8>, RemoteError> {
        self.fetch_path(&object_path(hash)).await
    }
}

/// Path of a loose object relative to the repository root.
pub fn object_path(hash: &ObjectHash) -> String {
    format!("objects/{}", hash.loose_path())
}

/// [`RemoteSource`] over HTTP(S).
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a remote rooted at `base_url` (the URL of the `.git` directory).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(base_url: impl Into<String>, config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_path(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let network = |message: String| RemoteError::Network {
            path: path.to_string(),
            message,
        };

        let response = self
            .client
            .get(self.url_for(path))
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(|e| network(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(path.to_string())),
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(network(format!("HTTP {}", status)))
            }
            status => Err(RemoteError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

/// Bounded exponential backoff for retryable fetch errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Fetch one object, retrying transient failures per `policy`.
pub async fn fetch_with_retry<R: RemoteSource + ?Sized>(
    remote: &R,
    hash: &ObjectHash,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, RemoteError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match remote.fetch(hash).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(%hash, attempt, ?delay, error = %e, "retrying fetch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
