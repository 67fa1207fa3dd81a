//! Per-session fetch state
//!
//! Tracks land in a fixed-capacity arena addressed by rank, sized from
//! the provider-reported total on the first page. Pages may arrive in
//! any order; each rank slot is written at most once and slots of failed
//! pages simply stay empty. [`RankArena::compact`] produces the dense,
//! rank-ordered view.

use crate::models::Track;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest provider total a session accepts; the arena is sized from it
pub const MAX_TOTAL: usize = 100_000;

/// Rejected arena writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("Rank 0 is not a valid 1-based rank")]
    ZeroRank,

    #[error("Rank {rank} is beyond arena capacity {capacity}")]
    OutOfRange { rank: usize, capacity: usize },

    #[error("Rank {rank} is already filled")]
    Occupied { rank: usize },
}

/// Fixed-capacity storage of tracks by 1-based rank
#[derive(Debug, Clone, Default)]
pub struct RankArena {
    slots: Vec<Option<Track>>,
    filled: usize,
}

impl RankArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn get(&self, rank: usize) -> Option<&Track> {
        rank.checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    /// Write a track into the slot for its rank
    pub fn insert(&mut self, track: Track) -> Result<(), SlotError> {
        let rank = track.rank;
        let index = rank.checked_sub(1).ok_or(SlotError::ZeroRank)?;
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { rank, capacity })?;
        if slot.is_some() {
            return Err(SlotError::Occupied { rank });
        }
        *slot = Some(track);
        self.filled += 1;
        Ok(())
    }

    /// Occupied slots in rank order, gaps removed
    pub fn compact(&self) -> Vec<Track> {
        self.slots.iter().flatten().cloned().collect()
    }
}

/// Bookkeeping for one fetch session
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    total: Option<usize>,
    max_requested: usize,
    arena: RankArena,
}

impl FetchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider total, once the first page has arrived
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Offset one past the highest page requested so far
    pub fn max_requested(&self) -> usize {
        self.max_requested
    }

    /// Whether the first page has been fetched
    pub fn is_started(&self) -> bool {
        self.total.is_some()
    }

    /// Record the first page (offset 0, `page_size` items requested):
    /// learn the total and size the arena
    ///
    /// Later totals are ignored; the arena never grows.
    pub fn start(&mut self, total: usize, page_size: usize) {
        if let Some(known) = self.total {
            if known != total {
                debug!(known, reported = total, "Ignoring changed provider total");
            }
            return;
        }
        self.total = Some(total);
        self.arena = RankArena::with_capacity(total);
        self.max_requested = self.max_requested.max(page_size);
    }

    /// More pages exist beyond those already requested
    ///
    /// Unknown totals count as "more".
    pub fn has_more(&self) -> bool {
        self.total.map_or(true, |total| self.max_requested < total)
    }

    /// Reserve offsets for up to `pages` further pages
    ///
    /// The highest requested offset only ever moves forward.
    pub fn reserve(&mut self, pages: Option<usize>, page_size: usize) -> Vec<usize> {
        let Some(total) = self.total else {
            return Vec::new();
        };
        let mut offsets = Vec::new();
        while self.max_requested < total && pages.map_or(true, |p| offsets.len() < p) {
            offsets.push(self.max_requested);
            self.max_requested += page_size;
        }
        offsets
    }

    /// Store a page of tracks; returns how many were written
    pub fn store(&mut self, tracks: &[Track]) -> usize {
        let mut stored = 0;
        for track in tracks {
            match self.arena.insert(track.clone()) {
                Ok(()) => stored += 1,
                Err(e) => warn!(id = %track.id, error = %e, "Dropping track"),
            }
        }
        stored
    }

    pub fn arena(&self) -> &RankArena {
        &self.arena
    }

    /// Dense, rank-ordered tracks fetched so far
    pub fn dense(&self) -> Vec<Track> {
        self.arena.compact()
    }
}
