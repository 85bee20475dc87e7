//! QR Code Scan Records
//!
//! A Rust library for scanning QR codes with a camera, extracting student
//! attendance fields from the decoded text, and storing the scans.
//!
//! # Features
//!
//! - Camera capture loop with explicit feed release on every exit
//! - Heuristic payload parsing (JSON, query strings, delimited text, `key: value` lines)
//! - Append-only SQLite record store with paging and totals
//! - Editable scan form with form-urlencoded submission
//! - Test payload generator

/// Camera capture loop
pub mod capture;
/// Configuration management
pub mod config;
/// Record store and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Scan form and submission
pub mod form;
/// Test payload generator
pub mod generator;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Payload parsing
pub mod parser;
/// Database schema definitions
pub mod schema;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use capture::{CaptureSession, CaptureState, ScanOutcome};
pub use db::Database;
pub use error::{Result, ScanRecordError};
pub use form::{ScanForm, ScanSubmission};
pub use models::{ActionResponse, Field, NewScanRecord, ParsedFields, ScanRecord, ScanStats};
pub use parser::{classify, parse, PayloadFormat};
