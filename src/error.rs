//! Error taxonomy shared by every collaborator seam.
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | [`ResolveError::Validation`] | Malformed input or oracle output that does not match its schema |
//! | [`ResolveError::Transport`] | Any external call failure: network, rate limit, timeout |
//! | [`ResolveError::NotFound`] | Logical absence, e.g. an unknown series id |
//!
//! The date resolver surfaces these to its caller. The resolution engine and
//! the metadata extractor swallow them and return degraded values instead.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failure raised by a resolution component or one of its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Validation(format!("malformed response body: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Bound an external call by `limit`.
///
/// An elapsed timeout is reported as [`ResolveError::Transport`] so callers
/// treat it like any other failed round trip.
pub async fn with_timeout<T, F>(limit: Duration, label: &str, fut: F) -> ResolveResult<T>
where
    F: Future<Output = ResolveResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ResolveError::transport(format!(
            "{} timed out after {}s",
            label,
            limit.as_secs_f64()
        ))),
    }
}
