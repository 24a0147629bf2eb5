use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use super::decode::decode_body;
use crate::config::FetcherConfig;

/// Errors from a single source fetch attempt.
///
/// None of these reach callers of [`SourceFetcher::fetch_all`]; they drive
/// the retry loop and end up in logs.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Empty response body")]
    EmptyBody,
}

/// Downloads playlist sources with bounded concurrency and retries.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    concurrency: usize,
    retries: u32,
    timeout: Duration,
    retry_base: Duration,
    /// Added to the backoff once per previous attempt.
    retry_step: Duration,
}

impl SourceFetcher {
    pub fn new(client: reqwest::Client, config: &FetcherConfig) -> Self {
        Self {
            client,
            concurrency: config.concurrency.max(1),
            retries: config.retries,
            timeout: config.timeout(),
            retry_base: config.retry_base(),
            retry_step: Duration::from_secs(1),
        }
    }

    /// Overrides the per-attempt backoff increment (one second by default).
    pub fn with_retry_step(mut self, step: Duration) -> Self {
        self.retry_step = step;
        self
    }

    /// Fetches every source and returns their decoded contents.
    ///
    /// The result has one entry per source, in input order. A source that
    /// fails every attempt yields an empty string; nothing here fails the
    /// batch. `on_progress` receives `(completed, total)` once per source.
    pub async fn fetch_all<F>(&self, sources: &[String], on_progress: F) -> Vec<String>
    where
        F: Fn(usize, usize),
    {
        let total = sources.len();
        let completed = AtomicUsize::new(0);
        let on_progress = &on_progress;
        let completed = &completed;

        stream::iter(sources.iter())
            .map(|url| async move {
                let content = self.fetch_with_retry(url).await;
                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                on_progress(done, total);
                content
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_with_retry(&self, url: &str) -> String {
        let attempts = self.retries.saturating_add(1);
        for attempt in 0..attempts {
            match self.fetch_once(url).await {
                Ok(content) => {
                    tracing::debug!(url = %url, bytes = content.len(), "Fetched source");
                    return content;
                }
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.retry_base + self.retry_step * attempt;
                    tracing::warn!(
                        url = %url,
                        attempt = attempt + 1,
                        attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Source fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(url = %url, attempts = attempts, error = %e, "Source fetch failed");
                }
            }
        }
        String::new()
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await?;
            Ok((bytes, content_type))
        };

        let (bytes, content_type) = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)??;

        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        Ok(decode_body(&bytes, content_type.as_deref()))
    }
}
