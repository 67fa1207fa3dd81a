//! Filter pipeline over ordered track lists
//!
//! Every filter keeps the relative order of its input. The pipeline
//! applies them cheapest/most selective first:
//! 1. eligibility by release date
//! 2. membership in the reference list
//! 3. per-artist quota (must see the already-narrowed list)
//!
//! [`rerank`] is a separate step that replaces provider ranks with the
//! 1-based position in the filtered output.

use crate::models::{ReferenceList, Track};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Eligibility window for a voting year: `[1 Dec year-1, 1 Dec year)`
///
/// For 2019 this is 1 December 2018 (inclusive) to 1 December 2019
/// (exclusive). `None` only for years outside chrono's range.
pub fn eligibility_period(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year.checked_sub(1)?, 12, 1)?;
    let end = NaiveDate::from_ymd_opt(year, 12, 1)?;
    Some((start, end))
}

/// Whether a track's release date falls inside the window for `year`
///
/// Tracks without a usable release date are never eligible.
pub fn is_eligible(track: &Track, year: i32) -> bool {
    match (track.release_date, eligibility_period(year)) {
        (Some(date), Some((start, end))) => date >= start && date < end,
        _ => false,
    }
}

/// Voting year currently open at `now` (local time)
///
/// Voting for a year closes at 03:00 on 28 January of the following
/// year; until then the previous calendar year is still upcoming.
pub fn upcoming_year(now: NaiveDateTime) -> i32 {
    let year = now.year();
    let closes = NaiveDate::from_ymd_opt(year, 1, 28).and_then(|d| d.and_hms_opt(3, 0, 0));
    match closes {
        Some(closes) if now < closes => year - 1,
        _ => year,
    }
}

/// Keep tracks eligible for `year`
pub fn by_year(tracks: Vec<Track>, year: i32) -> Vec<Track> {
    if eligibility_period(year).is_none() {
        warn!(year, "Eligibility year out of range, rejecting all tracks");
    }
    tracks.into_iter().filter(|t| is_eligible(t, year)).collect()
}

/// Keep tracks whose identity appears in the reference list
///
/// `None` means the list has not been loaded (yet, or it failed to
/// load) and passes everything through. A loaded but empty list
/// rejects everything.
pub fn by_voting_list(tracks: Vec<Track>, reference: Option<&ReferenceList>) -> Vec<Track> {
    match reference {
        None => tracks,
        Some(list) => tracks.into_iter().filter(|t| list.has_id(&t.id)).collect(),
    }
}

/// Admit tracks in order while no artist exceeds `max_per_artist`
///
/// A track credited to several artists is admitted only if every one
/// of them is still under quota; a rejected track counts against no
/// one. `None` is unlimited and skips counting entirely.
pub fn by_artist_quota(tracks: Vec<Track>, max_per_artist: Option<usize>) -> Vec<Track> {
    let Some(limit) = max_per_artist else {
        return tracks;
    };

    let mut counts: HashMap<String, usize> = HashMap::new();
    tracks
        .into_iter()
        .filter(|track| {
            let admitted = track
                .artists
                .iter()
                .all(|artist| counts.get(artist).copied().unwrap_or(0) < limit);
            if admitted {
                for artist in &track.artists {
                    *counts.entry(artist.clone()).or_insert(0) += 1;
                }
            }
            admitted
        })
        .collect()
}

/// Assign rank = 1-based position
pub fn rerank(mut tracks: Vec<Track>) -> Vec<Track> {
    for (i, track) in tracks.iter_mut().enumerate() {
        track.rank = i + 1;
    }
    tracks
}

/// Composed filters for one voting event and its settings
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    year: Option<i32>,
    reference: Option<Arc<ReferenceList>>,
    max_per_artist: Option<usize>,
}

impl FilterPipeline {
    /// Pipeline that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_reference_list(mut self, reference: Arc<ReferenceList>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_artist_quota(mut self, max_per_artist: Option<usize>) -> Self {
        self.max_per_artist = max_per_artist;
        self
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn reference_list(&self) -> Option<&ReferenceList> {
        self.reference.as_deref()
    }

    pub fn max_per_artist(&self) -> Option<usize> {
        self.max_per_artist
    }

    /// Run the filters in fixed precedence; ranks are left untouched
    pub fn apply(&self, tracks: &[Track]) -> Vec<Track> {
        let mut out = tracks.to_vec();
        if let Some(year) = self.year {
            out = by_year(out, year);
        }
        out = by_voting_list(out, self.reference.as_deref());
        by_artist_quota(out, self.max_per_artist)
    }

    /// Filter then rerank, as shown to the reader
    pub fn apply_ranked(&self, tracks: &[Track]) -> Vec<Track> {
        rerank(self.apply(tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Source, TrackId, VotingEntry};

    fn track(id: &str, artists: &[&str]) -> Track {
        Track {
            id: TrackId::from(id),
            title: id.to_uppercase(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            album: String::new(),
            release_date: None,
            external_url: String::new(),
            thumbnail: None,
            rank: 0,
            sources: vec![Source::LongTerm],
        }
    }

    fn released(id: &str, y: i32, m: u32, d: u32) -> Track {
        Track {
            release_date: NaiveDate::from_ymd_opt(y, m, d),
            ..track(id, &["X"])
        }
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    fn reference(ids: &[&str]) -> ReferenceList {
        ReferenceList::new(
            ids.iter()
                .map(|id| VotingEntry {
                    title: id.to_string(),
                    artist_name: String::new(),
                    spotify_track_id: id.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_eligibility_boundaries_for_2019() {
        let tracks = vec![
            released("2018-12-01", 2018, 12, 1),
            released("2018-11-30", 2018, 11, 30),
            released("2019-11-30", 2019, 11, 30),
            released("2019-12-01", 2019, 12, 1),
        ];

        let eligible = by_year(tracks, 2019);
        assert_eq!(ids(&eligible), vec!["2018-12-01", "2019-11-30"]);
    }

    #[test]
    fn test_out_of_range_year_rejects_everything() {
        assert_eq!(eligibility_period(i32::MIN), None);
        assert_eq!(eligibility_period(i32::MAX), None);

        let tracks = vec![released("2019-05-01", 2019, 5, 1)];
        assert!(by_year(tracks.clone(), i32::MIN).is_empty());
        assert!(by_year(tracks, i32::MAX).is_empty());
    }

    #[test]
    fn test_missing_release_date_is_ineligible() {
        assert!(!is_eligible(&track("a", &["X"]), 2019));
    }

    #[test]
    fn test_upcoming_year_switches_after_voting_closes() {
        let jan_first = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let feb_first = NaiveDate::from_ymd_opt(2020, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let at_close = NaiveDate::from_ymd_opt(2020, 1, 28)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap();

        assert_eq!(upcoming_year(jan_first), 2019);
        assert_eq!(upcoming_year(feb_first), 2020);
        assert_eq!(upcoming_year(at_close), 2020);
    }

    #[test]
    fn test_membership_filter() {
        let list = reference(&["t1", "t2"]);
        let result = by_voting_list(vec![track("t1", &["X"]), track("t3", &["X"])], Some(&list));
        assert_eq!(ids(&result), vec!["t1"]);
    }

    #[test]
    fn test_membership_not_loaded_versus_empty() {
        let input = vec![track("t1", &["X"]), track("t2", &["Y"])];

        let not_loaded = by_voting_list(input.clone(), None);
        assert_eq!(ids(&not_loaded), vec!["t1", "t2"]);

        let empty = ReferenceList::default();
        assert!(by_voting_list(input, Some(&empty)).is_empty());
    }

    #[test]
    fn test_artist_quota_of_two() {
        let input = vec![
            track("a1", &["X"]),
            track("a2", &["X"]),
            track("a3", &["X"]),
            track("b1", &["Y"]),
        ];
        assert_eq!(ids(&by_artist_quota(input, Some(2))), vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn test_unlimited_quota_returns_input_unchanged() {
        let input = vec![track("a1", &["X"]), track("a2", &["X"]), track("a3", &["X"])];
        assert_eq!(by_artist_quota(input.clone(), None), input);
    }

    #[test]
    fn test_rejected_collaboration_does_not_consume_quota() {
        // "collab" is rejected because X is full; Y must still have room for y1
        let input = vec![
            track("x1", &["X"]),
            track("collab", &["Y", "X"]),
            track("y1", &["Y"]),
        ];
        assert_eq!(ids(&by_artist_quota(input, Some(1))), vec!["x1", "y1"]);
    }

    #[test]
    fn test_pipeline_applies_all_filters_and_reranks() {
        let list = Arc::new(reference(&["a1", "a2", "a3", "b1"]));
        let pipeline = FilterPipeline::new()
            .with_year(2019)
            .with_reference_list(list)
            .with_artist_quota(Some(1));

        let mut input = vec![
            released("a1", 2019, 3, 1),
            released("zz", 2019, 3, 1),
            released("a2", 2019, 4, 1),
            released("a3", 2017, 4, 1),
            Track {
                artists: vec!["Y".to_string()],
                ..released("b1", 2019, 5, 1)
            },
        ];
        for (i, t) in input.iter_mut().enumerate() {
            t.rank = i + 1;
        }

        let filtered = pipeline.apply(&input);
        assert_eq!(ids(&filtered), vec!["a1", "b1"]);
        assert_eq!(filtered[1].rank, 5);

        let ranked = pipeline.apply_ranked(&input);
        assert_eq!(ranked.iter().map(|t| t.rank).collect::<Vec<_>>(), vec![1, 2]);
    }
}
