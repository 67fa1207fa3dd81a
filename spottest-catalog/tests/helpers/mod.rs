//! Scripted in-memory page source for fetcher and driver tests

#![allow(dead_code)]

use async_trait::async_trait;
use spottest_catalog::models::{Page, ReferenceList, TrackId, TrackRecord, VotingEntry};
use spottest_catalog::pager::{FetchError, PageSource};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serves `total` tracks with ids `t<id_base + rank>`
///
/// Records every request offset and the peak number of concurrent
/// requests. Offsets can be scripted to be rate limited a number of
/// times or to fail outright.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    total: usize,
    id_base: usize,
    delay: Duration,
    failing: HashSet<usize>,
    rate_limited: Mutex<Vec<(usize, u32)>>,
    requests: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn with_id_base(mut self, id_base: usize) -> Self {
        self.id_base = id_base;
        self
    }

    /// Every request takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests for `offset` fail with a server error
    pub fn failing_at(mut self, offset: usize) -> Self {
        self.failing.insert(offset);
        self
    }

    /// The first `times` requests for `offset` are rate limited
    pub fn rate_limited_at(self, offset: usize, times: u32) -> Self {
        self.rate_limited.lock().unwrap().push((offset, times));
        self
    }

    /// Every offset requested so far, in request order
    pub fn requests(&self) -> Vec<usize> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn take_rate_limit(&self, offset: usize) -> bool {
        let mut scripted = self.rate_limited.lock().unwrap();
        match scripted.iter_mut().find(|(o, left)| *o == offset && *left > 0) {
            Some((_, left)) => {
                *left -= 1;
                true
            }
            None => false,
        }
    }

    fn record(&self, offset: usize, limit: usize) -> Vec<TrackRecord> {
        let end = (offset + limit).min(self.total);
        (offset..end)
            .map(|i| {
                let rank = i + 1;
                TrackRecord {
                    id: TrackId::new(format!("t{}", self.id_base + rank)),
                    title: format!("Track {}", self.id_base + rank),
                    artists: vec![format!("Artist {}", rank % 7)],
                    album: "Album".to_string(),
                    release_date: None,
                    external_url: String::new(),
                    thumbnail: None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page<TrackRecord>, FetchError> {
        self.requests.lock().unwrap().push(offset);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.take_rate_limit(offset) {
            return Err(FetchError::RateLimited { retry_after: None });
        }
        if self.failing.contains(&offset) {
            return Err(FetchError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }

        Ok(Page {
            items: self.record(offset, limit),
            offset,
            total: self.total,
        })
    }
}

/// Reference list admitting exactly `ids`
pub fn reference_of<I: IntoIterator<Item = String>>(ids: I) -> ReferenceList {
    ReferenceList::new(
        ids.into_iter()
            .map(|id| VotingEntry {
                title: id.clone(),
                artist_name: String::new(),
                spotify_track_id: id,
            })
            .collect(),
    )
}
