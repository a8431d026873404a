/*!
 * Tests for application configuration functionality
 */

use std::path::PathBuf;
use std::time::Duration;

use subburn::app_config::{Config, LogLevel};

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.service.endpoint, "http://localhost:8000/api");
    assert!(config.service.api_key.is_empty());
    assert_eq!(config.service.timeout_secs, 60);

    assert_eq!(config.preview.debounce(), Duration::from_millis(250));
    assert_eq!(config.preview.cache_max_size, 64);
    assert_eq!(config.preview.cache_ttl(), Duration::from_secs(300));

    assert_eq!(config.export.poll_interval(), Duration::from_secs(1));
    assert_eq!(config.export.max_consecutive_poll_failures, 5);
    assert!(config.export.download_dir.is_none());

    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.service.endpoint = "ftp://example.com".to_string();
    assert!(config.validate().is_err());
    config.service.endpoint = "not a url".to_string();
    assert!(config.validate().is_err());
    config.service.endpoint = "https://render.example.com/api".to_string();
    assert!(config.validate().is_ok());

    config.preview.cache_max_size = 0;
    assert!(config.validate().is_err());
    config.preview.cache_max_size = 8;

    config.export.poll_interval_ms = 0;
    assert!(config.validate().is_err());
    config.export.poll_interval_ms = 500;

    config.export.max_consecutive_poll_failures = 0;
    assert!(config.validate().is_err());
    config.export.max_consecutive_poll_failures = 1;

    config.service.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_deserialize_withPartialJson_shouldFillDefaults() {
    let json = r#"{
        "service": { "endpoint": "https://render.example.com" },
        "preview": { "debounce_ms": 100 },
        "log_level": "debug"
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.service.endpoint, "https://render.example.com");
    assert_eq!(config.service.timeout_secs, 60);
    assert_eq!(config.preview.debounce_ms, 100);
    assert_eq!(config.preview.cache_max_size, 64);
    assert_eq!(config.export.max_consecutive_poll_failures, 5);
    assert_eq!(config.log_level, LogLevel::Debug);
}

#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> anyhow::Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let created = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(created.preview, Config::default().preview);

    let reloaded = Config::from_file(&path)?;
    assert_eq!(reloaded.service.endpoint, created.service.endpoint);
    Ok(())
}

#[test]
fn test_save_and_load_withCustomValues_shouldRoundTrip() -> anyhow::Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("custom.json");

    let mut config = Config::default();
    config.export.download_dir = Some(PathBuf::from("/tmp/exports"));
    config.preview.cache_ttl_secs = 42;
    config.log_level = LogLevel::Trace;
    config.save(&path)?;

    let loaded = Config::load_or_create(&path)?;
    assert_eq!(loaded.export.download_dir, Some(PathBuf::from("/tmp/exports")));
    assert_eq!(loaded.export.resolved_download_dir(), PathBuf::from("/tmp/exports"));
    assert_eq!(loaded.preview.cache_ttl_secs, 42);
    assert_eq!(loaded.log_level, LogLevel::Trace);
    Ok(())
}

#[test]
fn test_from_file_withInvalidJson_shouldFail() -> anyhow::Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "broken.json", "{ not json")?;
    assert!(Config::from_file(&path).is_err());
    Ok(())
}
