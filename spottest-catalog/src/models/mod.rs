//! Data models for tracks, pages and reference lists

pub mod track;
pub mod voting_list;

pub use track::{parse_release_date, Page, Source, Track, TrackId, TrackRecord};
pub use voting_list::{prepare_voting_list, ReferenceList, VotingEntry};
