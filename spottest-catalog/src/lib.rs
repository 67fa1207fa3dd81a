//! # Spottest Catalog
//!
//! Builds a reader's voting candidates from their listening history:
//! - [`pager`]: rate-limit-aware, bounded-concurrency paged fetching
//! - [`registry`]: order-preserving merge of several source lists
//! - [`filters`]: eligibility, reference-list and artist-quota filters
//! - [`driver`]: fetch until a filtered view has enough matches
//! - [`countdown`]: built-in voting events
//! - [`session`]: the above wired together for one user
//! - [`provider`]: Spotify Web API page source

pub mod countdown;
pub mod driver;
pub mod error;
pub mod filters;
pub mod models;
pub mod pager;
pub mod provider;
pub mod registry;
pub mod session;

pub use error::{CatalogError, Result};
