//! Network content tier
//!
//! Batch fetch of stitches from the content API. The request is idempotent,
//! so transient failures are retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::Stitch;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Content service rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Source of stitches from beyond the device
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the given stitches. Ids the service does not know are simply
    /// absent from the result.
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Stitch>, FetchError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    stitch_ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    #[serde(default)]
    stitches: Vec<Stitch>,
    #[serde(default)]
    error: Option<String>,
}

/// `ContentFetcher` over HTTP: `POST {base}/api/content/batch`
pub struct HttpContentFetcher {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpContentFetcher {
    pub fn new(base_url: String, timeout: Duration, max_retries: u32) -> Result<Self, FetchError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            base_url,
            max_retries,
            retry_delay: Duration::from_millis(250),
        })
    }

    fn batch_url(&self) -> String {
        format!("{}/api/content/batch", self.base_url)
    }

    async fn fetch_once(&self, ids: &[String]) -> Result<Vec<Stitch>, FetchError> {
        let response = self
            .client
            .post(self.batch_url())
            .json(&BatchRequest { stitch_ids: ids })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            status => {
                return Err(FetchError::Server {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }
        }

        let body: BatchResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(FetchError::Rejected(error));
        }
        Ok(body.stitches)
    }
}

/// Client errors other than timeouts will not get better on retry
fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        FetchError::Server { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Stitch>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            match self.fetch_once(ids).await {
                Ok(stitches) => return Ok(stitches),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    log::debug!(
                        "Content fetch attempt {} failed ({}), retrying",
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
