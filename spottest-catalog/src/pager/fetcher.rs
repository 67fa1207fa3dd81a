//! Bounded-concurrency paged fetcher
//!
//! The first page (offset 0) is always fetched on its own to learn the
//! provider total. After that, page requests run through a worker pool
//! of at most `concurrency` requests and are stored as they complete,
//! which is not necessarily offset order.
//!
//! Two modes:
//! - **bulk** ([`PagedFetcher::fetch_all`]): every remaining page, delivered
//!   as a stream of [`PageOutcome`]s in completion order. Each offset is
//!   reserved only when its request is dispatched.
//! - **incremental** ([`PagedFetcher::load_more`]): `N` pages past the
//!   highest offset requested so far, reserved together
//!
//! Only one batch runs per session at a time. An incremental call that
//! arrives while a batch is in flight waits for it to settle and
//! requests nothing, so offsets are never requested twice.
//!
//! Every session has a generation number. [`PagedFetcher::reset`] starts a
//! new generation; results of requests dispatched under an older one are
//! discarded when they complete instead of being merged.

use super::guard::{RateLimitGuard, RetryPolicy};
use super::source::{FetchError, PageSource};
use super::state::{FetchState, MAX_TOTAL};
use crate::models::{Page, Source, Track, TrackRecord};
use async_stream::stream;
use futures::stream::{self as futures_stream, Stream, StreamExt};
use spottest_common::config::{FetchConfig, MAX_PAGE_SIZE};
use spottest_common::events::{CatalogEvent, EventBus};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// A page that failed with a non-retriable error
#[derive(Debug, Clone, PartialEq)]
pub struct PageFailure {
    pub offset: usize,
    pub error: FetchError,
}

/// Result of one page in bulk mode
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Loaded { offset: usize, tracks: Vec<Track> },
    Failed(PageFailure),
}

/// Tracks gathered by one incremental batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadBatch {
    /// New tracks, in offset order
    pub tracks: Vec<Track>,
    /// Pages that failed; their ranks stay empty for the session
    pub failures: Vec<PageFailure>,
    pub pages_requested: usize,
}

/// Outcome of [`PagedFetcher::load_more`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoadMore {
    /// Pages were requested and have settled
    Loaded(LoadBatch),
    /// Another batch was in flight; waited for it and requested nothing
    Busy,
    /// The first page has not been fetched yet
    NotStarted,
    /// Every page has already been requested
    Exhausted,
}

struct Session {
    generation: u64,
    state: FetchState,
    in_flight: bool,
}

struct Inner {
    source: Arc<dyn PageSource>,
    tag: Source,
    page_size: usize,
    concurrency: usize,
    guard: RateLimitGuard,
    session: Mutex<Session>,
    // Mirrors `Session::in_flight` for the current generation
    loading: watch::Sender<bool>,
    events: Option<EventBus>,
}

enum BatchStart {
    Started { generation: u64, offsets: Vec<usize> },
    Busy,
    NotStarted,
    Exhausted,
}

/// Ends a batch when dropped, including when the batch future is abandoned
struct BatchGuard {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.inner.finish_batch(self.generation);
    }
}

/// Reject totals too large to size a rank arena for
fn check_total(page: Page<TrackRecord>) -> Result<Page<TrackRecord>, FetchError> {
    if page.total > MAX_TOTAL {
        return Err(FetchError::Parse(format!(
            "Implausible total of {} items (limit {})",
            page.total, MAX_TOTAL
        )));
    }
    Ok(page)
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CatalogEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }

    // Call with the session lock held so `loading` and `in_flight` agree
    fn set_loading(&self, loading: bool) {
        let changed = self.loading.send_if_modified(|current| {
            let changed = *current != loading;
            *current = loading;
            changed
        });
        if changed {
            self.emit(CatalogEvent::LoadingChanged {
                loading,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn finish_batch(&self, generation: u64) {
        let mut session = self.session();
        if session.generation == generation && session.in_flight {
            session.in_flight = false;
            self.set_loading(false);
        }
    }

    /// Reserve the next unrequested offset, unless the session moved on
    fn reserve_next(&self, generation: u64) -> Option<usize> {
        let mut session = self.session();
        if session.generation != generation {
            return None;
        }
        session.state.reserve(Some(1), self.page_size).pop()
    }

    async fn fetch_and_store(&self, generation: u64, offset: usize) -> Result<Vec<Track>, FetchError> {
        let source = &self.source;
        let limit = self.page_size;
        let result = self
            .guard
            .run(offset, || source.fetch_page(offset, limit))
            .await
            .and_then(check_total);

        let mut session = self.session();
        if session.generation != generation {
            debug!(offset, generation, "Discarding page from abandoned session");
            return Err(FetchError::StaleSession { offset });
        }

        match result {
            Ok(mut page) => {
                page.offset = offset;
                if !session.state.is_started() {
                    session.state.start(page.total, self.page_size);
                }
                let tracks = page.into_tracks(self.tag);
                let stored = session.state.store(&tracks);
                drop(session);

                debug!(source = %self.tag, offset, count = tracks.len(), stored, "Page loaded");
                self.emit(CatalogEvent::PageLoaded {
                    offset,
                    count: tracks.len(),
                    timestamp: chrono::Utc::now(),
                });
                Ok(tracks)
            }
            Err(e) => {
                drop(session);
                error!(source = %self.tag, offset, error = %e, "Page request failed");
                self.emit(CatalogEvent::PageFailed {
                    offset,
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                Err(e)
            }
        }
    }
}

/// Fetcher for one paged source within one session
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct PagedFetcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for PagedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedFetcher")
            .field("source", &self.inner.tag)
            .field("page_size", &self.inner.page_size)
            .field("concurrency", &self.inner.concurrency)
            .field("generation", &self.generation())
            .finish()
    }
}

impl PagedFetcher {
    pub fn new(source: Arc<dyn PageSource>, tag: Source, config: &FetchConfig) -> Self {
        Self::build(source, tag, config, None)
    }

    /// Fetcher that reports progress on `events`
    pub fn with_events(
        source: Arc<dyn PageSource>,
        tag: Source,
        config: &FetchConfig,
        events: EventBus,
    ) -> Self {
        Self::build(source, tag, config, Some(events))
    }

    fn build(
        source: Arc<dyn PageSource>,
        tag: Source,
        config: &FetchConfig,
        events: Option<EventBus>,
    ) -> Self {
        let mut guard = RateLimitGuard::new(RetryPolicy::from(config));
        if let Some(events) = &events {
            guard = guard.with_events(events.clone());
        }
        let (loading, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                source,
                tag,
                page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
                concurrency: config.concurrency.max(1),
                guard,
                session: Mutex::new(Session {
                    generation: 0,
                    state: FetchState::new(),
                    in_flight: false,
                }),
                loading,
                events,
            }),
        }
    }

    /// Provenance tag applied to every fetched track
    pub fn source_tag(&self) -> Source {
        self.inner.tag
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn generation(&self) -> u64 {
        self.inner.session().generation
    }

    pub fn total(&self) -> Option<usize> {
        self.inner.session().state.total()
    }

    pub fn is_started(&self) -> bool {
        self.inner.session().state.is_started()
    }

    /// Whether unrequested pages remain
    pub fn has_more(&self) -> bool {
        self.inner.session().state.has_more()
    }

    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    /// Dense, rank-ordered tracks of the current session
    pub fn tracks(&self) -> Vec<Track> {
        self.inner.session().state.dense()
    }

    /// Abandon the current session and start a new generation
    pub fn reset(&self) -> u64 {
        let generation = {
            let mut session = self.inner.session();
            session.generation += 1;
            session.state = FetchState::new();
            session.in_flight = false;
            self.inner.set_loading(false);
            session.generation
        };
        info!(source = %self.inner.tag, generation, "Fetch session reset");
        self.inner.emit(CatalogEvent::SessionReset {
            generation,
            timestamp: chrono::Utc::now(),
        });
        generation
    }

    /// Wait until no batch is in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.loading.subscribe();
        let _ = rx.wait_for(|loading| !*loading).await;
    }

    /// Fetch offset 0 and learn the total
    ///
    /// Returns the first page's tracks, or an empty list when the first
    /// page is already fetched or being fetched by another caller.
    pub async fn fetch_first_page(&self) -> Result<Vec<Track>, FetchError> {
        let generation = {
            let mut session = self.inner.session();
            if session.state.is_started() {
                return Ok(Vec::new());
            }
            if session.in_flight {
                None
            } else {
                session.in_flight = true;
                self.inner.set_loading(true);
                Some(session.generation)
            }
        };

        let Some(generation) = generation else {
            self.wait_idle().await;
            return Ok(Vec::new());
        };

        let _batch = BatchGuard {
            inner: Arc::clone(&self.inner),
            generation,
        };
        info!(source = %self.inner.tag, page_size = self.inner.page_size, "Fetching first page");
        self.inner.fetch_and_store(generation, 0).await
    }

    /// Fetch up to `pages` pages past the highest offset requested so far
    pub async fn load_more(&self, pages: usize) -> LoadMore {
        if pages == 0 {
            return LoadMore::Loaded(LoadBatch::default());
        }

        match self.begin_batch(Some(pages)) {
            BatchStart::Busy => {
                debug!(source = %self.inner.tag, "Batch in flight, waiting instead of requesting");
                self.wait_idle().await;
                LoadMore::Busy
            }
            BatchStart::NotStarted => LoadMore::NotStarted,
            BatchStart::Exhausted => LoadMore::Exhausted,
            BatchStart::Started { generation, offsets } => {
                let _batch = BatchGuard {
                    inner: Arc::clone(&self.inner),
                    generation,
                };
                let pages_requested = offsets.len();
                debug!(source = %self.inner.tag, ?offsets, "Loading more pages");

                let mut results: Vec<(usize, Result<Vec<Track>, FetchError>)> =
                    self.run_pages(generation, offsets).collect().await;
                results.sort_by_key(|(offset, _)| *offset);

                let mut batch = LoadBatch {
                    pages_requested,
                    ..LoadBatch::default()
                };
                for (offset, result) in results {
                    match result {
                        Ok(tracks) => batch.tracks.extend(tracks),
                        Err(error) => batch.failures.push(PageFailure { offset, error }),
                    }
                }
                LoadMore::Loaded(batch)
            }
        }
    }

    /// Fetch every remaining page, yielding each as it completes
    ///
    /// Fetches the first page too if the session has not started.
    /// Dropping the stream stops dispatching further pages.
    pub fn fetch_all(&self) -> impl Stream<Item = PageOutcome> + Send + 'static {
        let fetcher = self.clone();
        stream! {
            if !fetcher.is_started() {
                match fetcher.fetch_first_page().await {
                    Ok(tracks) if !tracks.is_empty() => {
                        yield PageOutcome::Loaded { offset: 0, tracks };
                    }
                    Ok(_) => {}
                    Err(error) => {
                        yield PageOutcome::Failed(PageFailure { offset: 0, error });
                        return;
                    }
                }
            }

            let generation = loop {
                match fetcher.begin_batch(None) {
                    BatchStart::Started { generation, .. } => break generation,
                    BatchStart::Busy => fetcher.wait_idle().await,
                    BatchStart::NotStarted | BatchStart::Exhausted => return,
                }
            };

            info!(source = %fetcher.inner.tag, total = ?fetcher.total(), "Fetching remaining pages");
            let _batch = BatchGuard {
                inner: Arc::clone(&fetcher.inner),
                generation,
            };
            let inner = Arc::clone(&fetcher.inner);
            let offsets = std::iter::from_fn(move || inner.reserve_next(generation));
            let mut pages = fetcher.run_pages(generation, offsets);
            while let Some((offset, result)) = pages.next().await {
                yield match result {
                    Ok(tracks) => PageOutcome::Loaded { offset, tracks },
                    Err(error) => PageOutcome::Failed(PageFailure { offset, error }),
                };
            }
        }
    }

    /// Claim the session for a batch
    ///
    /// With `Some(pages)` the batch's offsets are reserved here. With
    /// `None` (bulk) nothing is reserved yet and `offsets` is empty; the
    /// caller reserves each offset as it dispatches it.
    fn begin_batch(&self, pages: Option<usize>) -> BatchStart {
        let mut session = self.inner.session();
        if session.in_flight {
            return BatchStart::Busy;
        }
        if !session.state.is_started() {
            return BatchStart::NotStarted;
        }
        let offsets = match pages {
            Some(pages) => session.state.reserve(Some(pages), self.inner.page_size),
            None => Vec::new(),
        };
        let exhausted = match pages {
            Some(_) => offsets.is_empty(),
            None => !session.state.has_more(),
        };
        if exhausted {
            return BatchStart::Exhausted;
        }
        session.in_flight = true;
        self.inner.set_loading(true);
        BatchStart::Started {
            generation: session.generation,
            offsets,
        }
    }

    /// Request `offsets` with at most `concurrency` in flight
    ///
    /// Offsets are pulled from the iterator only when a worker slot frees.
    fn run_pages<I>(
        &self,
        generation: u64,
        offsets: I,
    ) -> impl Stream<Item = (usize, Result<Vec<Track>, FetchError>)> + Send + 'static
    where
        I: IntoIterator<Item = usize>,
        I::IntoIter: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let concurrency = inner.concurrency;
        futures_stream::iter(offsets)
            .map(move |offset| {
                let inner = Arc::clone(&inner);
                async move {
                    let result = inner.fetch_and_store(generation, offset).await;
                    (offset, result)
                }
            })
            .buffer_unordered(concurrency)
    }
}
