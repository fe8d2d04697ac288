//! Source retrieval: download a submission's document (or read it from disk).
//!
//! ## Why bytes and not a temp file?
//!
//! pdfium loads straight from a byte slice, and the redaction variant needs
//! the original bytes again to write the cleaned copy. Keeping the download
//! in memory avoids a temp directory per submission; CVs are small.
//!
//! Retry lives in [`fetch_with_retry`], outside the fetcher, so any
//! [`SourceFetcher`] (including test fakes) gets the same policy.

use crate::config::RetryPolicy;
use crate::error::{CvFlowError, FetchError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retrieves document bytes for a source location.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &str, credential: Option<&str>) -> Result<Vec<u8>, FetchError>;
}

/// Check if the source string looks like a URL.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// HTTP(S) fetcher with a local-path fallback.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CvFlowError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| CvFlowError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn download(&self, url: &str, credential: Option<&str>) -> Result<Vec<u8>, FetchError> {
        info!("Downloading document from: {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.map_reqwest(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_reqwest(url, e))?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    fn map_reqwest(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            FetchError::Connection {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &str, credential: Option<&str>) -> Result<Vec<u8>, FetchError> {
        if is_url(source) {
            self.download(source, credential).await
        } else {
            let bytes = tokio::fs::read(source).await.map_err(|e| FetchError::Local {
                path: source.to_string(),
                detail: e.to_string(),
            })?;
            debug!("Read local document {} ({} bytes)", source, bytes.len());
            Ok(bytes)
        }
    }
}

/// Fetch with exponential backoff on retryable failures.
///
/// Returns the bytes and the number of attempts used, or the last error and
/// the attempt count. Non-retryable errors return after the first attempt.
pub async fn fetch_with_retry(
    fetcher: &dyn SourceFetcher,
    source: &str,
    credential: Option<&str>,
    policy: &RetryPolicy,
) -> Result<(Vec<u8>, u32), (FetchError, u32)> {
    let max = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match fetcher.fetch(source, credential).await {
            Ok(bytes) => return Ok((bytes, attempt)),
            Err(e) if attempt < max && e.is_retryable() => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    "Fetch attempt {}/{} failed, retrying after {:?}: {}",
                    attempt, max, backoff, e
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}
