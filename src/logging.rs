use std::path::Path;
use std::str::FromStr;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Result, ScanRecordError};

/// Line format for every log sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ScanRecordError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ScanRecordError::InvalidConfig(format!(
                "Invalid log format: {other}. Must be one of: [\"text\", \"json\"]"
            ))),
        }
    }
}

/// Keeps the background log-file writer alive. Hold it until shutdown.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize structured logging system
///
/// Both the stderr layer and the optional file layer write `format` lines.
pub fn init_logging(
    log_level: Option<&str>,
    log_file: Option<&Path>,
    format: LogFormat,
) -> Result<LoggingGuard> {
    // Set up environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("info")))
        .map_err(|e| ScanRecordError::InvalidConfig(format!("Failed to create log filter: {e}")))?;

    let json = format == LogFormat::Json;

    // Console layer; an unset Option layer is a no-op
    let console_text = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
    });
    let console_json = json.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .json()
    });

    // Add file layer if log file is specified
    let (file_writer, guard) = match log_file {
        Some(log_path) => {
            let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = log_path
                .file_name()
                .map_or_else(|| "qrscan.log".into(), |name| name.to_string_lossy().into_owned());
            let (writer, guard) = non_blocking(rolling::daily(directory, file_name));
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_text = file_writer.clone().filter(|_| !json).map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });
    let file_json = file_writer.filter(|_| json).map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .json()
    });

    Registry::default()
        .with(env_filter)
        .with(console_text)
        .with(console_json)
        .with(file_text)
        .with(file_json)
        .try_init()
        .map_err(|e| ScanRecordError::Other(format!("Failed to install logger: {e}")))?;

    info!(?format, "Logging system initialized");
    Ok(LoggingGuard { _file: guard })
}

/// Performance timing utilities
pub struct OperationTimer {
    operation: String,
    start: std::time::Instant,
}

impl OperationTimer {
    /// Start timing `operation`.
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: std::time::Instant::now(),
        }
    }

    /// Log the elapsed milliseconds and return them.
    pub fn finish(self) -> u128 {
        let duration = self.start.elapsed().as_millis();
        tracing::info!(
            operation = %self.operation,
            duration_ms = duration,
            "Operation completed"
        );
        duration
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            let duration = self.start.elapsed().as_millis();
            tracing::debug!(
                operation = %self.operation,
                duration_ms = duration,
                "Operation finished"
            );
        }
    }
}
