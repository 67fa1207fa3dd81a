//! Tracing subscriber setup shared by the spottest binaries

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Accepted values for `[logging] level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check that a configured level is one tracing understands
pub fn validate_level(level: &str) -> Result<()> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Unknown log level '{}' (expected one of: {})",
            level,
            LOG_LEVELS.join(", ")
        )))
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    validate_level(&config.level)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_ascii_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_level_accepts_known_levels() {
        for level in LOG_LEVELS {
            assert!(validate_level(level).is_ok());
        }
        assert!(validate_level("DEBUG").is_ok());
    }

    #[test]
    fn test_validate_level_rejects_unknown() {
        let err = validate_level("verbose").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
