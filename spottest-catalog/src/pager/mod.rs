//! Paged retrieval of a remote ranked list
//!
//! - [`source`]: the page-retrieval capability and its error type
//! - [`guard`]: rate-limit guard wrapping every page request
//! - [`state`]: per-session fetch state (rank arena + offset bookkeeping)
//! - [`fetcher`]: bounded-concurrency bulk and incremental fetching

pub mod fetcher;
pub mod guard;
pub mod source;
pub mod state;

pub use fetcher::{LoadBatch, LoadMore, PageFailure, PageOutcome, PagedFetcher};
pub use guard::{DispatchGate, RateLimitGuard, RetryPolicy};
pub use source::{FetchError, PageSource};
pub use state::{FetchState, RankArena, SlotError, MAX_TOTAL};
