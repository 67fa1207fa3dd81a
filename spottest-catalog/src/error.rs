//! Error types for spottest-catalog

use crate::pager::FetchError;
use thiserror::Error;

/// Catalog error type
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Page retrieval failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Reference list could not be read or converted
    #[error("Reference list error: {0}")]
    ReferenceList(String),

    /// Malformed JSON document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No voting event registered under this id
    #[error("Unknown voting event: {0}")]
    UnknownEvent(String),

    /// spottest-common error
    #[error("Common error: {0}")]
    Common(#[from] spottest_common::Error),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
