//! Configuration loading and resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SPOTTEST_*`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! The first two tiers are handled by the binary's argument parser; this
//! module covers the TOML file and the defaults behind it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Provider ceiling on items per page
pub const MAX_PAGE_SIZE: usize = 50;

const CONFIG_DIR_NAME: &str = "spottest";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration loaded from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TomlConfig {
    // Plain values must precede tables in the serialized file
    /// Path to a reference (voting) list document
    #[serde(default)]
    pub voting_list: Option<PathBuf>,

    /// Maximum tracks per artist; absent means unlimited
    #[serde(default)]
    pub max_per_artist: Option<usize>,

    /// Voting event id to select on startup
    #[serde(default)]
    pub event: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Paged fetcher and rate-limit settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Adaptive load driver settings
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Cooldown growth between consecutive rate-limit rejections of one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same cooldown every time
    #[default]
    Fixed,
    /// Cooldown doubles per attempt up to `max_cooldown_ms`
    Exponential,
}

/// Paged fetcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Items per page request (1..=50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum concurrent page requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause after a rate-limit rejection
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Retry ceiling for rate-limited pages; absent retries forever
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Cooldown growth policy
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Upper bound on a single exponential cooldown
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            concurrency: default_concurrency(),
            cooldown_ms: default_cooldown_ms(),
            max_retries: None,
            backoff: BackoffKind::default(),
            max_cooldown_ms: default_max_cooldown_ms(),
        }
    }
}

impl FetchConfig {
    /// Clamp values into the ranges the fetcher accepts
    pub fn normalized(mut self) -> Self {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            warn!(
                page_size = self.page_size,
                "page_size out of range, clamping to 1..={}", MAX_PAGE_SIZE
            );
            self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        }
        if self.concurrency == 0 {
            warn!("concurrency of 0 would stall fetching, using 1");
            self.concurrency = 1;
        }
        if self.max_cooldown_ms < self.cooldown_ms {
            self.max_cooldown_ms = self.cooldown_ms;
        }
        self
    }
}

/// Adaptive load driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Pages requested per "load more" call
    #[serde(default = "default_pages_per_call")]
    pub pages_per_call: usize,

    /// Matches to gather when a session starts
    #[serde(default = "default_initial_target")]
    pub initial_target: usize,

    /// Matches to gather when the reader nears the end of the list
    #[serde(default = "default_scroll_target")]
    pub scroll_target: usize,

    /// "Load more" calls allowed per throttle period
    #[serde(default = "default_throttle_burst")]
    pub throttle_burst: u32,

    /// Length of the throttle period
    #[serde(default = "default_throttle_period_ms")]
    pub throttle_period_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pages_per_call: default_pages_per_call(),
            initial_target: default_initial_target(),
            scroll_target: default_scroll_target(),
            throttle_burst: default_throttle_burst(),
            throttle_period_ms: default_throttle_period_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_concurrency() -> usize {
    5
}

fn default_cooldown_ms() -> u64 {
    2000
}

fn default_max_cooldown_ms() -> u64 {
    60_000
}

fn default_pages_per_call() -> usize {
    4
}

fn default_initial_target() -> usize {
    20
}

fn default_scroll_target() -> usize {
    1
}

fn default_throttle_burst() -> u32 {
    4
}

fn default_throttle_period_ms() -> u64 {
    2000
}

/// Platform config file location (`~/.config/spottest/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let mut config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.fetch = config.fetch.normalized();

    debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Load the config file, falling back to defaults
///
/// Never fails: a missing, unreadable or malformed file yields the
/// defaults together with the problem, which the caller reports once
/// logging is up.
pub fn load_or_default(path: Option<&Path>) -> (TomlConfig, Option<Error>) {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            return (
                TomlConfig::default(),
                Some(Error::Config(
                    "Could not determine config directory".to_string(),
                )),
            );
        }
    };

    if !path.exists() {
        return (
            TomlConfig::default(),
            Some(Error::Config(format!("No config file at {}", path.display()))),
        );
    }

    match load_toml_config(&path) {
        Ok(config) => (config, None),
        Err(e) => (TomlConfig::default(), Some(e)),
    }
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
