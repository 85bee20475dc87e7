//! Unit tests for config.rs module

use qrcode_scan_records::capture::{FacingMode, ScanSchedule};
use qrcode_scan_records::config::{AppConfig, DatabaseConfig, GeneratorConfig, LoggingConfig, ScannerConfig};
use qrcode_scan_records::logging::LogFormat;
use std::time::Duration;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.database.path, "data/qrcode_scans.db");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.database.connection_timeout_secs, 30);
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_scanner_config() {
    let config = AppConfig::default();

    assert_eq!(config.scanner.poll_interval_ms, 100);
    assert_eq!(config.scanner.warmup_ms, 1000);
    assert_eq!(config.scanner.max_polls, None);
    assert_eq!(config.records.page_size, 20);
    assert_eq!(config.generator.history_limit, 10);
}

#[test]
fn test_config_validation_success() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_config_validation_zero_max_connections() {
    let mut config = AppConfig::default();
    config.database.max_connections = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_empty_database_path() {
    let mut config = AppConfig::default();
    config.database.path = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_invalid_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_valid_log_levels() {
    for level in ["trace", "debug", "info", "warn", "error"] {
        let mut config = AppConfig::default();
        config.logging.level = level.to_string();
        assert!(config.validate().is_ok(), "level {level}");
    }
}

#[test]
fn test_config_validation_invalid_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_logging_format_selects_layer_format() {
    let mut config = AppConfig::default();
    assert_eq!(config.logging.log_format().unwrap(), LogFormat::Text);

    config.logging.format = "json".to_string();
    assert!(config.validate().is_ok());
    assert_eq!(config.logging.log_format().unwrap(), LogFormat::Json);
}

#[test]
fn test_config_validation_scanner_values() {
    let mut config = AppConfig::default();
    config.scanner.poll_interval_ms = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scanner.max_polls = Some(0);
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scanner.max_polls = Some(50);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_page_size_bounds() {
    let mut config = AppConfig::default();
    config.records.page_size = 0;
    assert!(config.validate().is_err());

    config.records.page_size = 500;
    assert!(config.validate().is_ok());

    config.records.page_size = 501;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_qr_size_bounds() {
    for (size, ok) in [(49, false), (50, true), (1000, true), (1001, false)] {
        let mut config = AppConfig::default();
        config.generator = GeneratorConfig {
            qr_size: size,
            ..GeneratorConfig::default()
        };
        assert_eq!(config.validate().is_ok(), ok, "qr_size {size}");
    }
}

#[test]
fn test_video_constraints_from_scanner_config() {
    let mut config = AppConfig::default();
    config.scanner.ideal_width = 640;
    config.scanner.ideal_height = 480;

    let constraints = config.video_constraints();
    assert_eq!(constraints.facing, FacingMode::Environment);
    assert_eq!(constraints.ideal_width, 640);
    assert_eq!(constraints.ideal_height, 480);
}

#[test]
fn test_scan_schedule_from_scanner_config() {
    let scanner = ScannerConfig {
        poll_interval_ms: 250,
        warmup_ms: 0,
        max_polls: Some(40),
        ..ScannerConfig::default()
    };
    let schedule = ScanSchedule::from(&scanner);
    assert_eq!(schedule.interval, Duration::from_millis(250));
    assert_eq!(schedule.warmup, Duration::ZERO);
    assert_eq!(schedule.max_polls, Some(40));
}

#[test]
fn test_logging_config_with_file_path() {
    let logging = LoggingConfig {
        file_path: Some("logs/qrscan.log".to_string()),
        format: "json".to_string(),
        ..LoggingConfig::default()
    };
    assert_eq!(logging.file_path.as_deref(), Some("logs/qrscan.log"));
    assert_eq!(logging.level, "info");
}

#[test]
fn test_config_deserializes_partial_json() {
    let config: AppConfig = serde_json::from_str(r#"{"scanner":{"poll_interval_ms":50}}"#).unwrap();
    assert_eq!(config.scanner.poll_interval_ms, 50);
    assert_eq!(config.scanner.warmup_ms, 1000);
    assert_eq!(config.database.path, DatabaseConfig::default().path);
}

#[test]
fn test_config_clone() {
    let config = AppConfig::default();
    let cloned = config.clone();
    assert_eq!(config.database.path, cloned.database.path);
    assert_eq!(config.generator.qr_size, cloned.generator.qr_size);
}
