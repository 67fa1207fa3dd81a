//! Rate-limit guard
//!
//! Wraps each page request. When the provider rejects a request as
//! rate limited, the shared [`DispatchGate`] closes for a cooldown:
//! requests already on the wire finish normally, but no worker sends a
//! new one until the gate reopens. The rejected offset is then retried
//! as-is, so it keeps its ordering slot and costs no extra page budget.
//! Any other error is returned to the caller untouched.

use super::source::FetchError;
use spottest_common::config::{BackoffKind, FetchConfig};
use spottest_common::events::{CatalogEvent, EventBus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// How long to back off and how often to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Cooldown after the first rejection
    pub cooldown: Duration,
    /// `None` retries forever
    pub max_retries: Option<u32>,
    pub backoff: BackoffKind,
    /// Ceiling for exponential growth
    pub max_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
            max_retries: config.max_retries,
            backoff: config.backoff,
            max_cooldown: Duration::from_millis(config.max_cooldown_ms.max(config.cooldown_ms)),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `rejections` rate-limit responses
    pub fn allows_retry(&self, rejections: u32) -> bool {
        self.max_retries.map_or(true, |max| rejections <= max)
    }

    /// Cooldown after the `rejection`-th consecutive rejection (1-based)
    ///
    /// A provider `Retry-After` hint is honoured as a lower bound.
    pub fn cooldown_for(&self, rejection: u32, retry_after: Option<Duration>) -> Duration {
        let base = match self.backoff {
            BackoffKind::Fixed => self.cooldown,
            BackoffKind::Exponential => {
                let factor = 1u32.checked_shl(rejection.saturating_sub(1)).unwrap_or(u32::MAX);
                self.cooldown.saturating_mul(factor).min(self.max_cooldown)
            }
        };
        retry_after.map_or(base, |hint| base.max(hint))
    }
}

/// Pause switch shared by every worker of one fetcher
///
/// Closing an already-closed gate extends it to the later deadline.
#[derive(Debug, Default)]
pub struct DispatchGate {
    resume_at: Mutex<Option<Instant>>,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop new dispatch for `cooldown`
    pub async fn suspend_for(&self, cooldown: Duration) {
        let until = Instant::now() + cooldown;
        let mut resume_at = self.resume_at.lock().await;
        if resume_at.map_or(true, |current| current < until) {
            *resume_at = Some(until);
        }
    }

    pub async fn is_suspended(&self) -> bool {
        matches!(*self.resume_at.lock().await, Some(until) if until > Instant::now())
    }

    /// Wait until dispatch is allowed
    pub async fn wait_open(&self) {
        loop {
            let until = *self.resume_at.lock().await;
            match until {
                Some(until) if until > Instant::now() => sleep_until(until).await,
                _ => return,
            }
        }
    }
}

/// Retry wrapper applied to every page request of a fetcher
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    policy: RetryPolicy,
    gate: Arc<DispatchGate>,
    events: Option<EventBus>,
}

impl RateLimitGuard {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            gate: Arc::new(DispatchGate::new()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn gate(&self) -> &DispatchGate {
        &self.gate
    }

    /// Run `request` for `offset`, retrying rate-limit rejections
    pub async fn run<T, F, Fut>(&self, offset: usize, mut request: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut rejections = 0u32;
        loop {
            self.gate.wait_open().await;

            match request().await {
                Err(FetchError::RateLimited { retry_after }) => {
                    rejections += 1;
                    if !self.policy.allows_retry(rejections) {
                        warn!(offset, attempts = rejections, "Rate-limit retry ceiling reached");
                        return Err(FetchError::RetriesExhausted {
                            offset,
                            attempts: rejections,
                        });
                    }

                    let cooldown = self.policy.cooldown_for(rejections, retry_after);
                    warn!(
                        offset,
                        attempt = rejections,
                        cooldown_ms = cooldown.as_millis() as u64,
                        "Rate limited, pausing dispatch"
                    );
                    if let Some(events) = &self.events {
                        events.emit_lossy(CatalogEvent::RateLimited {
                            offset,
                            cooldown_ms: cooldown.as_millis() as u64,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    self.gate.suspend_for(cooldown).await;
                }
                other => {
                    if rejections > 0 {
                        debug!(offset, retries = rejections, "Request settled after rate limiting");
                    }
                    return other;
                }
            }
        }
    }
}
