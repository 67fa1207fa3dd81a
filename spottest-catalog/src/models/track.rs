//! Track and page types
//!
//! A [`TrackRecord`] is what a page source hands back: display metadata
//! only. Once its position in the source ordering is known it becomes a
//! [`Track`], carrying a 1-based rank and the provenance tags of the
//! lists that contributed it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable provider identity of a track
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source list a track was fetched from (provenance tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Top tracks over several years
    LongTerm,
    /// Top tracks over roughly six months
    MediumTerm,
    /// Top tracks over roughly four weeks
    ShortTerm,
    /// Saved tracks library
    Library,
}

impl Source {
    /// Provider `time_range` parameter for top-items sources
    pub fn time_range(&self) -> Option<&'static str> {
        match self {
            Source::LongTerm => Some("long_term"),
            Source::MediumTerm => Some("medium_term"),
            Source::ShortTerm => Some("short_term"),
            Source::Library => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::LongTerm => "long_term",
            Source::MediumTerm => "medium_term",
            Source::ShortTerm => "short_term",
            Source::Library => "library",
        };
        f.write_str(name)
    }
}

/// Track metadata as delivered by a page source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: TrackId,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    /// Album release date; `None` when the provider value was unparseable
    pub release_date: Option<NaiveDate>,
    pub external_url: String,
    pub thumbnail: Option<String>,
}

impl TrackRecord {
    /// Attach ordering and provenance
    pub fn into_track(self, source: Source, rank: usize) -> Track {
        Track {
            id: self.id,
            title: self.title,
            artists: self.artists,
            album: self.album,
            release_date: self.release_date,
            external_url: self.external_url,
            thumbnail: self.thumbnail,
            rank,
            sources: vec![source],
        }
    }
}

/// A ranked track with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
    pub release_date: Option<NaiveDate>,
    pub external_url: String,
    pub thumbnail: Option<String>,
    /// 1-based position within the source ordering (or filtered output after rerank)
    pub rank: usize,
    /// Lists that contributed this track, first-seen first, no duplicates
    pub sources: Vec<Source>,
}

impl Track {
    pub fn has_source(&self, source: Source) -> bool {
        self.sources.contains(&source)
    }

    /// Add a provenance tag; returns false if it was already present
    pub fn add_source(&mut self, source: Source) -> bool {
        if self.has_source(source) {
            return false;
        }
        self.sources.push(source);
        true
    }

    /// Artists joined for display
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// One bounded batch of source results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Zero-based offset of the first item
    pub offset: usize,
    /// Provider-reported total item count
    pub total: usize,
}

impl Page<TrackRecord> {
    /// Convert records to tracks ranked `offset + index + 1`
    pub fn into_tracks(self, source: Source) -> Vec<Track> {
        let offset = self.offset;
        self.items
            .into_iter()
            .enumerate()
            .map(|(i, record)| record.into_track(source, offset + i + 1))
            .collect()
    }
}

/// Parse a provider release date
///
/// Dates come with year, month or day precision ("2019", "2019-05",
/// "2019-05-03"); coarser values resolve to the first day of the period.
pub fn parse_release_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let mut parts = value.splitn(3, '-');

    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> TrackRecord {
        TrackRecord {
            id: TrackId::from(id),
            title: format!("Title {}", id),
            artists: vec!["Artist".to_string()],
            album: "Album".to_string(),
            release_date: NaiveDate::from_ymd_opt(2019, 1, 1),
            external_url: format!("https://open.spotify.com/track/{}", id),
            thumbnail: None,
        }
    }

    #[test]
    fn test_parse_release_date_precisions() {
        assert_eq!(parse_release_date("2019-05-03"), NaiveDate::from_ymd_opt(2019, 5, 3));
        assert_eq!(parse_release_date("2019-05"), NaiveDate::from_ymd_opt(2019, 5, 1));
        assert_eq!(parse_release_date("2019"), NaiveDate::from_ymd_opt(2019, 1, 1));
    }

    #[test]
    fn test_parse_release_date_rejects_garbage() {
        assert_eq!(parse_release_date(""), None);
        assert_eq!(parse_release_date("0000-13-01"), None);
        assert_eq!(parse_release_date("soon"), None);
    }

    #[test]
    fn test_page_ranks_are_one_based_from_offset() {
        let page = Page {
            items: vec![record("a"), record("b")],
            offset: 50,
            total: 120,
        };

        let tracks = page.into_tracks(Source::ShortTerm);
        assert_eq!(tracks[0].rank, 51);
        assert_eq!(tracks[1].rank, 52);
        assert_eq!(tracks[1].sources, vec![Source::ShortTerm]);
    }

    #[test]
    fn test_add_source_is_idempotent() {
        let mut track = record("a").into_track(Source::LongTerm, 1);
        assert!(track.add_source(Source::Library));
        assert!(!track.add_source(Source::Library));
        assert!(!track.add_source(Source::LongTerm));
        assert_eq!(track.sources, vec![Source::LongTerm, Source::Library]);
    }
}
