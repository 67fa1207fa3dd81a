//! Page-retrieval capability

use crate::models::{Page, TrackRecord};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single page request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Provider asked us to slow down (HTTP 429); retried by the guard
    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate-limit retries hit the configured ceiling
    #[error("Gave up on offset {offset} after {attempts} rate-limited attempts")]
    RetriesExhausted { offset: usize, attempts: u32 },

    /// Completed after its session was reset; result discarded
    #[error("Result for offset {offset} belongs to an abandoned session")]
    StaleSession { offset: usize },
}

impl FetchError {
    /// The distinguishable "too many requests" signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

/// Remote paged source of ranked tracks
///
/// Implementations perform exactly one round-trip per call and never
/// retry; retry policy lives in [`super::RateLimitGuard`].
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch up to `limit` items starting at zero-based `offset`
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page<TrackRecord>, FetchError>;
}
