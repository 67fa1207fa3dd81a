//! # Spottest Common Library
//!
//! Shared code for the spottest workspace:
//! - Error type and result alias
//! - TOML configuration with layered resolution
//! - Logging initialisation
//! - Catalog event bus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{CatalogEvent, EventBus};
