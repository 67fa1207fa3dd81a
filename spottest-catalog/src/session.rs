//! Catalog session: one user's fetch session plus the selected voting event
//!
//! Switching events abandons the fetch session (new generation) so no
//! result of the previous one can leak into the new view.

use crate::countdown::{EventSettings, VotingEvent};
use crate::driver::{AdaptiveLoader, DriveReport, LoadTrigger};
use crate::models::{ReferenceList, Track, TrackId};
use crate::pager::{FetchError, LoadMore, PageFailure, PageOutcome, PagedFetcher};
use crate::registry::TrackRegistry;
use futures::stream::{self, StreamExt};
use spottest_common::config::DriverConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CatalogSession {
    loader: AdaptiveLoader,
    event: &'static VotingEvent,
    settings: EventSettings,
    reference: Option<Arc<ReferenceList>>,
}

impl CatalogSession {
    pub fn new(
        fetcher: PagedFetcher,
        event: &'static VotingEvent,
        reference: Option<Arc<ReferenceList>>,
        driver: &DriverConfig,
    ) -> Self {
        let settings = event.default_settings();
        let pipeline = event.pipeline(&settings, reference.clone());
        Self {
            loader: AdaptiveLoader::new(fetcher, pipeline, driver),
            event,
            settings,
            reference,
        }
    }

    /// Replace the loader, e.g. to disable throttling
    pub fn map_loader(mut self, f: impl FnOnce(AdaptiveLoader) -> AdaptiveLoader) -> Self {
        self.loader = f(self.loader);
        self
    }

    pub fn loader(&self) -> &AdaptiveLoader {
        &self.loader
    }

    pub fn fetcher(&self) -> &PagedFetcher {
        self.loader.fetcher()
    }

    pub fn event(&self) -> &'static VotingEvent {
        self.event
    }

    pub fn settings(&self) -> &EventSettings {
        &self.settings
    }

    pub fn reference_list(&self) -> Option<&ReferenceList> {
        self.reference.as_deref()
    }

    fn rebuild_pipeline(&self) {
        self.loader
            .set_pipeline(self.event.pipeline(&self.settings, self.reference.clone()));
    }

    /// Change settings; already fetched tracks are re-filtered, not refetched
    pub fn update_settings(&mut self, settings: EventSettings) {
        self.settings = settings;
        self.rebuild_pipeline();
    }

    /// Install (or clear) the reference list once it has loaded
    pub fn set_reference_list(&mut self, reference: Option<Arc<ReferenceList>>) {
        self.reference = reference;
        self.rebuild_pipeline();
    }

    /// Switch to another event and start a new fetch session
    ///
    /// Returns the new session generation.
    pub fn select_event(
        &mut self,
        event: &'static VotingEvent,
        reference: Option<Arc<ReferenceList>>,
    ) -> u64 {
        self.event = event;
        self.settings = event.default_settings();
        self.reference = reference;
        self.rebuild_pipeline();
        let generation = self.loader.fetcher().reset();
        info!(event = event.id, generation, "Voting event selected");
        generation
    }

    /// Fetch the first page and gather the initial set of matches
    pub async fn start(&self) -> Result<DriveReport, FetchError> {
        self.loader.on_trigger(LoadTrigger::SessionStart).await
    }

    /// The reader is near the end of the list: find at least one more match
    pub async fn on_near_end(&self) -> Result<DriveReport, FetchError> {
        self.loader.on_trigger(LoadTrigger::NearEnd).await
    }

    /// Explicit "load more" for `pages` pages
    pub async fn request_more(&self, pages: usize) -> LoadMore {
        self.loader.request_more(pages).await
    }

    /// Filtered and reranked view of everything fetched so far
    pub fn filtered_tracks(&self) -> Vec<Track> {
        self.loader.pipeline().apply_ranked(&self.fetcher().tracks())
    }

    pub fn has_more(&self) -> bool {
        self.fetcher().has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.fetcher().is_loading()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.fetcher().subscribe_loading()
    }
}

/// Everything gathered by [`collect_sources`]
///
/// `registry` holds tracks in arrival order, which depends on network
/// timing. Use [`Collection::ordered`] for a stable order.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub registry: TrackRegistry,
    pub failures: Vec<PageFailure>,
    // Best (source index, provider rank) seen per track
    positions: HashMap<TrackId, (usize, usize)>,
}

impl Collection {
    fn record(&mut self, source_index: usize, tracks: &[Track]) {
        for track in tracks {
            let position = (source_index, track.rank);
            self.positions
                .entry(track.id.clone())
                .and_modify(|best| *best = (*best).min(position))
                .or_insert(position);
        }
        self.registry = self.registry.merge(tracks);
    }

    /// Tracks ordered by the first source listing them, then by that
    /// source's rank
    ///
    /// Independent of the order pages arrived in.
    pub fn ordered(&self) -> Vec<Track> {
        let mut tracks = self.registry.to_vec();
        tracks.sort_by_key(|track| {
            self.positions
                .get(&track.id)
                .copied()
                .unwrap_or((usize::MAX, usize::MAX))
        });
        tracks
    }
}

/// Bulk-fetch every source and merge pages into one registry as they arrive
///
/// Sources are fetched side by side; each keeps its own concurrency
/// bound and rate-limit gate. Failed pages are collected, not fatal.
/// The position of each fetcher in `fetchers` is its precedence in
/// [`Collection::ordered`].
pub async fn collect_sources(fetchers: &[PagedFetcher]) -> Collection {
    let streams = fetchers.iter().enumerate().map(|(index, fetcher)| {
        let tag = fetcher.source_tag();
        fetcher
            .fetch_all()
            .map(move |outcome| (index, tag, outcome))
            .boxed()
    });
    let mut outcomes = stream::select_all(streams);

    let mut collection = Collection::default();
    while let Some((index, tag, outcome)) = outcomes.next().await {
        match outcome {
            PageOutcome::Loaded { tracks, .. } => collection.record(index, &tracks),
            PageOutcome::Failed(failure) => {
                warn!(source = %tag, offset = failure.offset, error = %failure.error, "Page skipped");
                collection.failures.push(failure);
            }
        }
    }

    info!(
        sources = fetchers.len(),
        tracks = collection.registry.len(),
        failures = collection.failures.len(),
        "Sources collected"
    );
    collection
}
