//! Adaptive load driver: fetch until enough filtered matches exist
//!
//! Each cycle asks the fetcher for another batch of pages and runs the
//! filter pipeline over that batch only, never over earlier results.
//! The cycle ends once the running match count reaches the target, or
//! as soon as the fetcher has nothing more to give.
//!
//! Two triggers use it: session start (a larger target, 20 by default)
//! and the reader nearing the end of the rendered list (target 1). An
//! overlapping trigger finds the fetcher busy and ends without issuing
//! requests; the next trigger picks up from there.

use crate::filters::FilterPipeline;
use crate::pager::{FetchError, LoadMore, PageFailure, PagedFetcher};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use spottest_common::config::DriverConfig;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Why a drive cycle stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Running match count reached the target
    #[default]
    TargetReached,
    /// No pages left to request
    Exhausted,
    /// Another batch was in flight; this cycle issued nothing
    Busy,
    /// The first page has not been fetched
    NotStarted,
}

/// What happened during one drive cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveReport {
    /// Matches found among the tracks fetched in this cycle
    pub matches: usize,
    /// Tracks fetched in this cycle
    pub tracks_fetched: usize,
    /// Incremental batches issued
    pub batches: usize,
    pub failures: Vec<PageFailure>,
    pub stop: StopReason,
}

/// Event that causes a drive cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    SessionStart,
    NearEnd,
}

type Throttle = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Drives a [`PagedFetcher`] until a filter pipeline has enough matches
pub struct AdaptiveLoader {
    fetcher: PagedFetcher,
    pipeline: RwLock<Arc<FilterPipeline>>,
    pages_per_call: usize,
    initial_target: usize,
    scroll_target: usize,
    throttle: Option<Throttle>,
}

impl fmt::Debug for AdaptiveLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveLoader")
            .field("fetcher", &self.fetcher)
            .field("pages_per_call", &self.pages_per_call)
            .field("initial_target", &self.initial_target)
            .field("scroll_target", &self.scroll_target)
            .field("throttled", &self.throttle.is_some())
            .finish()
    }
}

/// "Load more" smoothing: `burst` calls per `period`, queued not dropped
fn build_throttle(burst: u32, period: Duration) -> Option<Throttle> {
    let burst = NonZeroU32::new(burst)?;
    let quota = Quota::with_period(period / burst.get())?.allow_burst(burst);
    Some(RateLimiter::direct(quota))
}

impl AdaptiveLoader {
    pub fn new(fetcher: PagedFetcher, pipeline: FilterPipeline, config: &DriverConfig) -> Self {
        Self {
            fetcher,
            pipeline: RwLock::new(Arc::new(pipeline)),
            pages_per_call: config.pages_per_call.max(1),
            initial_target: config.initial_target,
            scroll_target: config.scroll_target,
            throttle: build_throttle(
                config.throttle_burst,
                Duration::from_millis(config.throttle_period_ms),
            ),
        }
    }

    /// Disable "load more" smoothing
    pub fn without_throttle(mut self) -> Self {
        self.throttle = None;
        self
    }

    pub fn fetcher(&self) -> &PagedFetcher {
        &self.fetcher
    }

    pub fn pipeline(&self) -> Arc<FilterPipeline> {
        let guard = self.pipeline.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap the pipeline, e.g. after a settings change
    pub fn set_pipeline(&self, pipeline: FilterPipeline) {
        let mut guard = self.pipeline.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(pipeline);
    }

    /// Throttled "load more": waits for a throttle slot, then loads `pages`
    pub async fn request_more(&self, pages: usize) -> LoadMore {
        if let Some(throttle) = &self.throttle {
            throttle.until_ready().await;
        }
        self.fetcher.load_more(pages).await
    }

    /// Run the cycle for a trigger with its configured target
    pub async fn on_trigger(&self, trigger: LoadTrigger) -> Result<DriveReport, FetchError> {
        match trigger {
            LoadTrigger::SessionStart => self.start_session(self.initial_target).await,
            LoadTrigger::NearEnd => Ok(self.ensure_matches(self.scroll_target).await),
        }
    }

    /// Fetch the first page if needed, then keep loading until `target` matches
    ///
    /// Matches on the first page count toward the target.
    pub async fn start_session(&self, target: usize) -> Result<DriveReport, FetchError> {
        let first = self.fetcher.fetch_first_page().await?;
        let first_matches = self.pipeline().apply(&first).len();
        debug!(tracks = first.len(), matches = first_matches, "First page filtered");

        if first_matches >= target {
            return Ok(DriveReport {
                matches: first_matches,
                tracks_fetched: first.len(),
                ..DriveReport::default()
            });
        }

        let mut report = self.ensure_matches(target - first_matches).await;
        report.matches += first_matches;
        report.tracks_fetched += first.len();
        Ok(report)
    }

    /// Load batches until `target` new matches are found or pages run out
    pub async fn ensure_matches(&self, target: usize) -> DriveReport {
        let mut report = DriveReport::default();
        if target == 0 {
            return report;
        }

        loop {
            if !self.fetcher.has_more() {
                report.stop = StopReason::Exhausted;
                break;
            }
            match self.request_more(self.pages_per_call).await {
                LoadMore::Loaded(batch) => {
                    // The pipeline may be swapped between batches; use the current one
                    let found = self.pipeline().apply(&batch.tracks).len();
                    report.batches += 1;
                    report.matches += found;
                    report.tracks_fetched += batch.tracks.len();
                    report.failures.extend(batch.failures);
                    debug!(
                        fetched = batch.tracks.len(),
                        found,
                        running = report.matches,
                        target,
                        "Batch filtered"
                    );
                    if report.matches >= target {
                        report.stop = StopReason::TargetReached;
                        break;
                    }
                }
                LoadMore::Busy => {
                    report.stop = StopReason::Busy;
                    break;
                }
                LoadMore::NotStarted => {
                    report.stop = StopReason::NotStarted;
                    break;
                }
                LoadMore::Exhausted => {
                    report.stop = StopReason::Exhausted;
                    break;
                }
            }
        }

        info!(
            matches = report.matches,
            target,
            batches = report.batches,
            stop = ?report.stop,
            "Drive cycle finished"
        );
        report
    }
}
