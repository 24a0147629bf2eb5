use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::TesterConfig;
use crate::playlist::{Channel, Status};
use crate::util::EntryList;

/// Upper bound on bytes read per attempt.
///
/// Live streams never end; the throughput sample stops here.
const SAMPLE_LIMIT: usize = 2 * 1024 * 1024;

/// Errors from a single probe attempt.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Empty response body")]
    EmptyBody,
    #[error("Too slow: {speed:.2} KB/s")]
    TooSlow { speed: f64 },
}

/// Measures stream availability and throughput.
#[derive(Debug, Clone)]
pub struct SpeedProber {
    client: reqwest::Client,
    concurrency: usize,
    max_attempts: u32,
    timeout: Duration,
    min_speed: f64,
    retry_delay: Duration,
    chunk_size: usize,
    chunk_pause: Duration,
    log_outcomes: bool,
}

struct Sample {
    bytes: usize,
    elapsed: Duration,
}

impl SpeedProber {
    pub fn new(client: reqwest::Client, config: &TesterConfig) -> Self {
        Self {
            client,
            concurrency: config.concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            timeout: config.timeout(),
            min_speed: config.min_download_speed,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            chunk_size: config.chunk_size.max(1),
            chunk_pause: Duration::from_millis(config.chunk_pause_ms),
            log_outcomes: config.enable_logging,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Probes every channel and sets its status.
    ///
    /// Whitelisted channels go `Online` without a request. Every other
    /// channel ends `Online` or `Offline`; the URL of each channel that
    /// exhausted its attempts is added to `failed_urls`. `on_progress`
    /// receives `(completed, total)` once per channel.
    pub async fn probe<F>(
        &self,
        channels: &mut [Channel],
        mut on_progress: F,
        failed_urls: &mut HashSet<String>,
        whitelist: &EntryList,
    ) where
        F: FnMut(usize, usize),
    {
        let total = channels.len();
        let mut completed = 0usize;
        let chunk_count = total.div_ceil(self.chunk_size);

        for (index, chunk) in channels.chunks_mut(self.chunk_size).enumerate() {
            let mut pending = Vec::with_capacity(chunk.len());
            for channel in chunk.iter_mut() {
                if whitelist.matches(&channel.name, &channel.url) {
                    channel.status = Status::Online;
                    completed += 1;
                    on_progress(completed, total);
                } else {
                    pending.push(channel);
                }
            }

            let mut outcomes = stream::iter(pending)
                .map(|channel| self.probe_channel(channel))
                .buffer_unordered(self.concurrency);

            while let Some(failed) = outcomes.next().await {
                if let Some(url) = failed {
                    failed_urls.insert(url);
                }
                completed += 1;
                on_progress(completed, total);
            }

            if index + 1 < chunk_count && !self.chunk_pause.is_zero() {
                tokio::time::sleep(self.chunk_pause).await;
            }
        }
    }

    /// Returns the channel URL when every attempt failed.
    async fn probe_channel(&self, channel: &mut Channel) -> Option<String> {
        for attempt in 1..=self.max_attempts {
            let error = match self.sample(&channel.url).await {
                Ok(sample) => {
                    let secs = sample.elapsed.as_secs_f64().max(f64::EPSILON);
                    let speed = sample.bytes as f64 / secs / 1024.0;
                    if speed >= self.min_speed {
                        channel.status = Status::Online;
                        channel.response_time = secs;
                        channel.download_speed = speed;
                        if self.log_outcomes {
                            tracing::info!(
                                name = %channel.name,
                                url = %channel.url,
                                status = %channel.status,
                                speed_kbps = speed,
                                "Channel online"
                            );
                        }
                        return None;
                    }
                    ProbeError::TooSlow { speed }
                }
                Err(e) => e,
            };

            channel.status = Status::Offline;
            tracing::debug!(
                url = %channel.url,
                attempt = attempt,
                max_attempts = self.max_attempts,
                error = %error,
                "Probe attempt failed"
            );
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        if self.log_outcomes {
            tracing::warn!(
                name = %channel.name,
                url = %channel.url,
                status = %channel.status,
                "Channel offline"
            );
        }
        Some(channel.url.clone())
    }

    /// Downloads up to [`SAMPLE_LIMIT`] bytes and times it.
    ///
    /// The attempt timeout is a deadline for the whole sample. Reaching it
    /// before the response headers is a timeout; reaching it mid-body ends the
    /// sample with the bytes received so far.
    async fn sample(&self, url: &str) -> Result<Sample, ProbeError> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;

        let response = tokio::time::timeout_at(deadline, self.client.get(url).send())
            .await
            .map_err(|_| ProbeError::Timeout)??;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpStatus(status.as_u16()));
        }

        let mut bytes = 0usize;
        let mut body = response.bytes_stream();
        loop {
            match tokio::time::timeout_at(deadline, body.next()).await {
                Ok(Some(chunk)) => {
                    bytes += chunk?.len();
                    if bytes >= SAMPLE_LIMIT {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) if bytes > 0 => break,
                Err(_) => return Err(ProbeError::Timeout),
            }
        }

        if bytes == 0 {
            return Err(ProbeError::EmptyBody);
        }
        Ok(Sample {
            bytes,
            elapsed: start.elapsed(),
        })
    }
}
