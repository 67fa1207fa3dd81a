//! Built-in voting events
//!
//! Each event names the reference list it filters against and knows how
//! to assemble its [`FilterPipeline`] from the reader's settings.
//! Eligibility comes from either the reference list or the release-date
//! window, never both.

use crate::error::{CatalogError, Result};
use crate::filters::FilterPipeline;
use crate::models::ReferenceList;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader-adjustable settings for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Tracks admitted per artist; `None` is unlimited
    pub max_per_artist: Option<usize>,
    /// Overrides the event's eligibility year
    pub year: Option<i32>,
    /// Decide eligibility by the reference list (`true`) or by release year
    pub use_voting_list: bool,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            max_per_artist: None,
            year: None,
            use_voting_list: true,
        }
    }
}

/// A countdown the reader can prepare votes for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingEvent {
    pub id: &'static str,
    pub name: &'static str,
    /// File name of the event's reference list
    pub voting_list_file: &'static str,
    /// Release-date eligibility year, if the event has one
    pub year: Option<i32>,
    pub default_max_per_artist: Option<usize>,
}

static EVENTS: [VotingEvent; 2] = [
    VotingEvent {
        id: "2025-australian",
        name: "Hottest 100 of Australian Songs",
        voting_list_file: "2025_australian.json",
        year: None,
        default_max_per_artist: None,
    },
    VotingEvent {
        id: "2024",
        name: "Hottest 100 of 2024",
        voting_list_file: "2024.json",
        year: Some(2024),
        default_max_per_artist: None,
    },
];

/// Every built-in event, default first
pub fn all() -> &'static [VotingEvent] {
    &EVENTS
}

pub fn default_event() -> &'static VotingEvent {
    &EVENTS[0]
}

/// Look up an event by id (case-insensitive)
pub fn find(id: &str) -> Result<&'static VotingEvent> {
    EVENTS
        .iter()
        .find(|event| event.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| CatalogError::UnknownEvent(id.to_string()))
}

impl VotingEvent {
    /// Settings a reader starts from
    pub fn default_settings(&self) -> EventSettings {
        EventSettings {
            max_per_artist: self.default_max_per_artist,
            ..EventSettings::default()
        }
    }

    /// Where the event's reference list lives under `dir`
    pub fn voting_list_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.voting_list_file)
    }

    /// Filters for this event: eligibility (list or year), then artist quota
    ///
    /// Release-year eligibility applies only when the reader turned the
    /// reference list off and a year is known; otherwise the list decides.
    pub fn pipeline(
        &self,
        settings: &EventSettings,
        reference: Option<Arc<ReferenceList>>,
    ) -> FilterPipeline {
        let pipeline = match (settings.use_voting_list, settings.year.or(self.year)) {
            (false, Some(year)) => FilterPipeline::new().with_year(year),
            _ => match reference {
                Some(reference) => FilterPipeline::new().with_reference_list(reference),
                None => FilterPipeline::new(),
            },
        };
        pipeline.with_artist_quota(settings.max_per_artist)
    }
}
