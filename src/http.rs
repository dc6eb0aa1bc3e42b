//! JSON-over-HTTP request loop shared by the transport adapters.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 404 → [`ResolveError::NotFound`], no retry
//! - Other HTTP 4xx → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Retries live here and nowhere else; the resolution logic sees one
//! success or one failure per call. Callers that bound a whole call with
//! [`with_timeout`](crate::error::with_timeout) size the bound with
//! [`call_budget`] so the retries fit inside it.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{ResolveError, ResolveResult};

/// Send the request produced by `build`, retrying transient failures, and
/// decode the response body as JSON.
///
/// `build` is called once per attempt because a [`RequestBuilder`] is
/// consumed by `send`.
pub async fn send_json<F>(label: &str, max_retries: u32, build: F) -> ResolveResult<Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(label, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        ResolveError::validation(format!("{} returned invalid JSON: {}", label, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();

                if status == StatusCode::NOT_FOUND {
                    return Err(ResolveError::not_found(format!("{}: {}", label, body_text)));
                }

                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    last_err = Some(ResolveError::transport(format!(
                        "{} error {}: {}",
                        label, status, body_text
                    )));
                    continue;
                }

                return Err(ResolveError::transport(format!(
                    "{} error {}: {}",
                    label, status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(ResolveError::transport(format!("{}: {}", label, e)));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ResolveError::transport(format!("{} failed after retries", label))))
}

/// Sleep before retry number `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Worst-case duration of [`send_json`] when every attempt runs into the
/// per-request timeout: `max_retries + 1` attempts plus the backoff between
/// them.
pub fn call_budget(timeout_secs: u64, max_retries: u32) -> Duration {
    let attempts = Duration::from_secs(timeout_secs) * (max_retries + 1);
    (1..=max_retries).map(backoff_delay).sum::<Duration>() + attempts
}

/// Build a `reqwest` client with the given request timeout.
pub fn client(timeout_secs: u64) -> ResolveResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(ResolveError::from)
}
