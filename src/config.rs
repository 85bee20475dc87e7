use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanRecordError};
use crate::logging::LogFormat;

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite store location and pool sizing.
    pub database: DatabaseConfig,
    /// Log level, sink and line format.
    pub logging: LoggingConfig,
    /// Capture loop timing and camera constraints.
    pub scanner: ScannerConfig,
    /// Record listing defaults.
    pub records: RecordsConfig,
    /// Test payload generator settings.
    pub generator: GeneratorConfig,
}

/// `[database]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    pub path: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout_secs: u64,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Daily-rolling log file; stderr only when unset.
    pub file_path: Option<String>,
    /// `"text"` or `"json"`, applied to every sink.
    pub format: String,
}

/// `[scanner]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Milliseconds between detection attempts.
    pub poll_interval_ms: u64,
    /// Delay after the feed opens before the first attempt.
    pub warmup_ms: u64,
    /// Give up after this many attempts; unbounded when unset.
    pub max_polls: Option<u64>,
    /// Preferred capture width in pixels.
    pub ideal_width: u32,
    /// Preferred capture height in pixels.
    pub ideal_height: u32,
}

/// `[records]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// Records per page in listings.
    pub page_size: u32,
}

/// `[generator]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Generated payloads kept in history.
    pub history_limit: usize,
    /// Rendered QR image edge in pixels.
    pub qr_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/qrcode_scans.db".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            warmup_ms: 1000,
            max_polls: None,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            qr_size: 200,
        }
    }
}

impl LoggingConfig {
    /// The configured line format for log output
    pub fn log_format(&self) -> Result<LogFormat> {
        self.format.parse()
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&Self::default())?)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false))
            // Add environment variables with prefix, e.g. QRSCAN_SCANNER__POLL_INTERVAL_MS
            .add_source(
                Environment::with_prefix("QRSCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ScanRecordError::InvalidConfig(format!("Failed to load configuration: {e}")))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| ScanRecordError::InvalidConfig(format!("Failed to deserialize configuration: {e}")))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ScanRecordError::InvalidConfig(msg));

        // Validate database config
        if self.database.path.trim().is_empty() {
            return invalid("database.path must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return invalid("max_connections must be greater than 0".to_string());
        }
        if self.database.connection_timeout_secs == 0 {
            return invalid("connection_timeout_secs must be greater than 0".to_string());
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return invalid(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            ));
        }

        self.logging.log_format()?;

        // Validate scanner config
        if self.scanner.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be greater than 0".to_string());
        }
        if self.scanner.max_polls == Some(0) {
            return invalid("max_polls must be greater than 0 when set".to_string());
        }
        if self.scanner.ideal_width == 0 || self.scanner.ideal_height == 0 {
            return invalid("ideal camera dimensions must be greater than 0".to_string());
        }

        // Validate records config
        if self.records.page_size == 0 || self.records.page_size > crate::validation::MAX_LIST_LIMIT {
            return invalid(format!(
                "page_size must be between 1 and {}",
                crate::validation::MAX_LIST_LIMIT
            ));
        }

        // Validate generator config
        if self.generator.history_limit == 0 {
            return invalid("history_limit must be greater than 0".to_string());
        }
        if !(50..=1000).contains(&self.generator.qr_size) {
            return invalid("qr_size must be between 50 and 1000".to_string());
        }

        Ok(())
    }

    /// Get database path from environment or config
    pub fn get_database_path(&self) -> String {
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| self.database.path.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Camera constraints derived from the scanner settings
    pub const fn video_constraints(&self) -> crate::capture::VideoConstraints {
        crate::capture::VideoConstraints {
            facing: crate::capture::FacingMode::Environment,
            ideal_width: self.scanner.ideal_width,
            ideal_height: self.scanner.ideal_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, "data/qrcode_scans.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scanner.poll_interval_ms, 100);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
