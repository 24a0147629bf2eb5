//! Network side of the pipeline.
//!
//! - [`SourceFetcher`] downloads playlist sources with retries, preserving
//!   input order, and decodes them to text
//! - [`SpeedProber`] samples each channel's stream and marks it online or
//!   offline by measured throughput
//!
//! Both run as bounded `futures` streams on the caller's task, so progress
//! callbacks and result collection need no synchronization.

mod decode;
mod fetcher;
mod speed;

pub use decode::decode_body;
pub use fetcher::{FetchError, SourceFetcher};
pub use speed::{ProbeError, SpeedProber};

use reqwest::redirect::Policy;
use std::time::Duration;

const MAX_REDIRECTS: usize = 5;

/// Builds the HTTP client shared by both probers.
///
/// Per-request timeouts are applied by the probers themselves.
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy())
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// Limits redirect hops and rejects loops.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        tracing::trace!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}
