//! Integration tests for configuration loading and graceful degradation
//!
//! Missing or malformed config files must never stop startup: the loader
//! falls back to compiled defaults and hands the problem back for logging.
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate XDG_CONFIG_HOME are marked with #[serial].

use serial_test::serial;
use spottest_common::config::{
    load_or_default, load_toml_config, write_toml_config, BackoffKind, FetchConfig, TomlConfig,
};
use spottest_common::Error;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");

    let (config, problem) = load_or_default(Some(&path));
    assert_eq!(config, TomlConfig::default());

    // Reported to the caller so it can warn once logging is up
    let problem = problem.expect("missing file is reported");
    assert!(matches!(problem, Error::Config(_)));
    assert!(problem.to_string().contains("does-not-exist.toml"));
}

#[test]
fn test_malformed_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    assert!(load_toml_config(&path).is_err());
    let (config, problem) = load_or_default(Some(&path));
    assert_eq!(config, TomlConfig::default());
    assert!(matches!(problem, Some(Error::Config(message)) if message.contains("Parse")));
}

#[test]
fn test_valid_file_reports_no_problem() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "event = \"2024\"\n").unwrap();

    let (config, problem) = load_or_default(Some(&path));
    assert!(problem.is_none());
    assert_eq!(config.event.as_deref(), Some("2024"));
}

#[test]
fn test_write_then_load_preserves_settings() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let config = TomlConfig {
        voting_list: Some(PathBuf::from("/lists/2025_australian.json")),
        max_per_artist: Some(3),
        event: Some("2025-australian".to_string()),
        fetch: FetchConfig {
            concurrency: 3,
            max_retries: Some(6),
            backoff: BackoffKind::Exponential,
            ..FetchConfig::default()
        },
        ..TomlConfig::default()
    };

    write_toml_config(&config, &path).unwrap();
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_loaded_fetch_settings_are_normalized() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[fetch]\npage_size = 200\nconcurrency = 0\n").unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.fetch.page_size, 50);
    assert_eq!(config.fetch.concurrency, 1);
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_default_location_is_discovered() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("spottest");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "max_per_artist = 1\n").unwrap();

    let previous = env::var("XDG_CONFIG_HOME").ok();
    env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let (config, problem) = load_or_default(None);

    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }

    assert!(problem.is_none());
    assert_eq!(config.max_per_artist, Some(1));
}
