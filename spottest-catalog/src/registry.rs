//! Track registry: order-preserving merge and dedup across source lists
//!
//! Merging is non-destructive. [`TrackRegistry::merge`] returns a new
//! registry and leaves the receiver untouched, so readers holding an
//! older snapshot keep a consistent view.
//!
//! For each incoming track:
//! - unknown identity: inserted after all existing entries
//! - known identity: its provenance tags are appended to the existing
//!   entry when absent; title, artists, rank and all other metadata of
//!   the first-seen occurrence are kept

use crate::models::{Track, TrackId};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    tracks: Vec<Track>,
    index: HashMap<TrackId, usize>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: &TrackId) -> Option<&Track> {
        self.index.get(id).map(|&i| &self.tracks[i])
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.index.contains_key(id)
    }

    /// Merge a batch into a copy of this registry
    pub fn merge(&self, batch: &[Track]) -> TrackRegistry {
        let mut next = self.clone();
        for track in batch {
            next.absorb(track);
        }
        next
    }

    fn absorb(&mut self, incoming: &Track) {
        match self.index.get(&incoming.id) {
            Some(&i) => {
                let existing = &mut self.tracks[i];
                for &source in &incoming.sources {
                    if existing.add_source(source) {
                        trace!(id = %incoming.id, source = %source, "Added provenance tag");
                    }
                }
            }
            None => {
                self.index.insert(incoming.id.clone(), self.tracks.len());
                self.tracks.push(incoming.clone());
            }
        }
    }

    /// Tracks in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.tracks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    fn track(id: &str, title: &str, rank: usize, source: Source) -> Track {
        Track {
            id: TrackId::from(id),
            title: title.to_string(),
            artists: vec!["Artist".to_string()],
            album: "Album".to_string(),
            release_date: None,
            external_url: String::new(),
            thumbnail: None,
            rank,
            sources: vec![source],
        }
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let batch = vec![
            track("a", "A", 1, Source::LongTerm),
            track("b", "B", 2, Source::LongTerm),
        ];

        let once = TrackRegistry::new().merge(&batch);
        let twice = once.merge(&batch);

        assert_eq!(once.to_vec(), twice.to_vec());
        assert_eq!(twice.get(&TrackId::from("a")).unwrap().sources, vec![Source::LongTerm]);
    }

    #[test]
    fn test_existing_identity_gains_tag_but_keeps_metadata() {
        let registry = TrackRegistry::new().merge(&[track("a", "First", 3, Source::LongTerm)]);
        let merged = registry.merge(&[track("a", "Second", 1, Source::ShortTerm)]);

        let a = merged.get(&TrackId::from("a")).unwrap();
        assert_eq!(a.title, "First");
        assert_eq!(a.rank, 3);
        assert_eq!(a.sources, vec![Source::LongTerm, Source::ShortTerm]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_leaves_prior_snapshot_untouched() {
        let before = TrackRegistry::new().merge(&[track("a", "A", 1, Source::LongTerm)]);
        let after = before.merge(&[
            track("a", "A", 1, Source::Library),
            track("b", "B", 2, Source::Library),
        ]);

        assert_eq!(before.len(), 1);
        assert_eq!(before.get(&TrackId::from("a")).unwrap().sources, vec![Source::LongTerm]);
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn test_first_seen_order_is_preserved() {
        let registry = TrackRegistry::new()
            .merge(&[track("c", "C", 1, Source::LongTerm), track("a", "A", 2, Source::LongTerm)])
            .merge(&[track("b", "B", 1, Source::Library), track("c", "C", 2, Source::Library)]);

        let ids: Vec<&str> = registry.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_duplicates_within_one_batch_collapse() {
        let registry = TrackRegistry::new().merge(&[
            track("a", "A", 1, Source::LongTerm),
            track("a", "A again", 2, Source::LongTerm),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&TrackId::from("a")).unwrap().title, "A");
    }
}
