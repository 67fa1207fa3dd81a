//! Reference (voting) lists
//!
//! A reference list is loaded once per selected voting event and never
//! mutated afterwards. Membership tests are O(1) via an id set built at
//! construction time.

use crate::error::{CatalogError, Result};
use crate::models::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// One eligible track in a reference list document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingEntry {
    pub title: String,
    pub artist_name: String,
    pub spotify_track_id: String,
}

/// Immutable list of eligible tracks
#[derive(Debug, Clone, Default)]
pub struct ReferenceList {
    entries: Vec<VotingEntry>,
    ids: HashSet<String>,
}

impl ReferenceList {
    pub fn new(entries: Vec<VotingEntry>) -> Self {
        let ids = entries
            .iter()
            .map(|entry| entry.spotify_track_id.clone())
            .collect();
        Self { entries, ids }
    }

    /// Parse a reference list document (a JSON array of entries)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<VotingEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// Read a reference list document from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CatalogError::ReferenceList(format!("Read {} failed: {}", path.display(), e))
        })?;
        let list = Self::from_json_str(&content)?;
        info!(
            path = %path.display(),
            entries = list.len(),
            "Loaded reference list"
        );
        Ok(list)
    }

    pub fn has_id(&self, id: &TrackId) -> bool {
        self.ids.contains(id.as_str())
    }

    pub fn entries(&self) -> &[VotingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entry of a list as published by the event organiser
#[derive(Debug, Deserialize)]
struct PublishedEntry {
    title: String,
    #[serde(default)]
    spotify_track_id: Option<String>,
    #[serde(default)]
    is_official: bool,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    artists: Vec<PublishedArtist>,
}

#[derive(Debug, Deserialize)]
struct PublishedArtist {
    title: String,
}

/// Convert a published list into reference list entries
///
/// The published document is either a JSON array or an object keyed by
/// entry id. Only official, active entries with a track id are kept;
/// artist titles are joined with ", ".
pub fn prepare_voting_list(raw_json: &str) -> Result<Vec<VotingEntry>> {
    let value: serde_json::Value = serde_json::from_str(raw_json)?;
    let raw_entries: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => {
            return Err(CatalogError::ReferenceList(format!(
                "Expected an array or object of entries, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut entries = Vec::with_capacity(raw_entries.len());
    for raw in raw_entries {
        let published: PublishedEntry = serde_json::from_value(raw)?;
        if !(published.is_official && published.is_active) {
            continue;
        }
        let Some(track_id) = published.spotify_track_id.filter(|id| !id.is_empty()) else {
            debug!(title = %published.title, "Skipping entry without a track id");
            continue;
        };
        let artist_name = published
            .artists
            .iter()
            .map(|a| a.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        entries.push(VotingEntry {
            title: published.title,
            artist_name,
            spotify_track_id: track_id,
        });
    }

    Ok(entries)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
