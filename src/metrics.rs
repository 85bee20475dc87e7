use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::parser::PayloadFormat;

/// Metric names recorded by the crate.
///
/// Calls go through the `metrics` facade; without an installed recorder they
/// are no-ops, so library users opt in by installing their own exporter.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    // Parser metrics
    /// Counter by detected format.
    pub payloads_parsed_total: &'static str,

    // Capture metrics
    /// Counter by poll outcome.
    pub capture_polls_total: &'static str,
    /// Counter by how a session ended.
    pub capture_sessions_total: &'static str,
    /// Gauge of open video feeds.
    pub capture_active_feeds: &'static str,

    // Record store metrics
    /// Counter by operation and status.
    pub db_operations_total: &'static str,
    /// Histogram of operation latency.
    pub db_operation_duration: &'static str,
    /// Counter of stored scans.
    pub records_inserted_total: &'static str,

    // Generator metrics
    /// Counter by payload kind.
    pub payloads_generated_total: &'static str,

    // Error metrics
    /// Counter by error kind and operation.
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            payloads_parsed_total: "qrscan_payloads_parsed_total",

            capture_polls_total: "qrscan_capture_polls_total",
            capture_sessions_total: "qrscan_capture_sessions_total",
            capture_active_feeds: "qrscan_capture_active_feeds",

            db_operations_total: "qrscan_db_operations_total",
            db_operation_duration: "qrscan_db_operation_duration_seconds",
            records_inserted_total: "qrscan_records_inserted_total",

            payloads_generated_total: "qrscan_payloads_generated_total",

            errors_total: "qrscan_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Shared collector used by library code.
    pub fn global() -> &'static Self {
        static COLLECTOR: OnceLock<MetricsCollector> = OnceLock::new();
        COLLECTOR.get_or_init(Self::default)
    }

    /// Record the outcome of one parser run
    pub fn record_parse(&self, format: Option<PayloadFormat>) {
        let format = format.map_or("unrecognized", PayloadFormat::as_str);
        counter!(self.payloads_parsed_total, "format" => format).increment(1);
    }

    /// Record one capture poll by outcome label
    pub fn record_poll(&self, outcome: &'static str) {
        counter!(self.capture_polls_total, "outcome" => outcome).increment(1);
    }

    /// Record how a capture session ended
    pub fn record_session_end(&self, outcome: &'static str) {
        counter!(self.capture_sessions_total, "outcome" => outcome).increment(1);
    }

    /// Track the number of open video feeds
    pub fn feed_opened(&self) {
        gauge!(self.capture_active_feeds).increment(1.0);
    }

    /// Track the number of open video feeds
    pub fn feed_released(&self) {
        gauge!(self.capture_active_feeds).decrement(1.0);
    }

    /// Record database operation metrics
    pub fn record_db_operation(&self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };

        counter!(self.db_operations_total, "operation" => operation, "status" => status).increment(1);
        histogram!(self.db_operation_duration, "operation" => operation).record(duration.as_secs_f64());

        if !success {
            self.record_error("database", operation);
        }
    }

    /// Record a stored scan record
    pub fn record_insert(&self) {
        counter!(self.records_inserted_total).increment(1);
    }

    /// Record a generated payload
    pub fn record_generated(&self, kind: &'static str) {
        counter!(self.payloads_generated_total, "kind" => kind).increment(1);
    }

    /// Record error metrics
    pub fn record_error(&self, error_type: &'static str, operation: &'static str) {
        counter!(self.errors_total, "type" => error_type, "operation" => operation).increment(1);
    }
}

/// Times a database operation and reports it on [`MetricsTimer::finish`].
pub struct MetricsTimer {
    operation: &'static str,
    start: std::time::Instant,
}

impl MetricsTimer {
    /// Start timing `operation`.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
        }
    }

    /// Record the elapsed time and return it.
    pub fn finish(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        MetricsCollector::global().record_db_operation(self.operation, duration, success);
        duration
    }
}
