//! Catalog event definitions and the broadcast bus that carries them
//!
//! The fetch pipeline reports progress here so that a front end can
//! render a loading indicator and surface per-page failures without
//! polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while building a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// A new fetch session started; completions from older generations are discarded
    SessionReset {
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// The fetcher started or finished a batch of page requests
    LoadingChanged {
        loading: bool,
        timestamp: DateTime<Utc>,
    },

    /// A page was fetched and merged
    PageLoaded {
        offset: usize,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A page failed with a non-retriable error; its ranks stay empty
    PageFailed {
        offset: usize,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The provider rejected a request; dispatch is paused for `cooldown_ms`
    RateLimited {
        offset: usize,
        cooldown_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl CatalogEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::SessionReset { .. } => "SessionReset",
            CatalogEvent::LoadingChanged { .. } => "LoadingChanged",
            CatalogEvent::PageLoaded { .. } => "PageLoaded",
            CatalogEvent::PageFailed { .. } => "PageFailed",
            CatalogEvent::RateLimited { .. } => "RateLimited",
        }
    }
}

/// Broadcast bus for [`CatalogEvent`]s
///
/// Cloning the bus shares the underlying channel.
///
/// # Examples
///
/// ```
/// use spottest_common::events::{CatalogEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(CatalogEvent::LoadingChanged {
///     loading: true,
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; having no subscribers is not an error
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
