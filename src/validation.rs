use std::path::Path;

use crate::error::{Result, ScanRecordError};

/// Largest page a list query may ask for.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Longest payload accepted for storage. QR codes top out well below this.
pub const MAX_RAW_TEXT_LEN: usize = 8192;

fn invalid(msg: impl Into<String>) -> ScanRecordError {
    ScanRecordError::Validation(msg.into())
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate the raw scanned payload before it is stored
    pub fn validate_raw_text(raw_text: &str) -> Result<()> {
        if raw_text.trim().is_empty() {
            return Err(invalid("QR code content (qrcode_message) is required"));
        }

        if raw_text.len() > MAX_RAW_TEXT_LEN {
            return Err(invalid(format!(
                "QR code content too long (max {MAX_RAW_TEXT_LEN} bytes)"
            )));
        }

        if raw_text.contains('\0') {
            return Err(invalid("QR code content contains a null byte"));
        }

        Ok(())
    }

    /// Validate the page size of a list query
    pub fn validate_list_limit(limit: u32) -> Result<()> {
        if limit == 0 {
            return Err(invalid("Limit must be greater than 0"));
        }

        if limit > MAX_LIST_LIMIT {
            return Err(invalid(format!("Limit too large (max {MAX_LIST_LIMIT})")));
        }

        Ok(())
    }

    /// Validate a 1-based page number
    pub fn validate_page(page: u32) -> Result<()> {
        if page == 0 {
            return Err(invalid("Page numbers start at 1"));
        }

        Ok(())
    }

    /// Validate email format.
    ///
    /// Stored emails are never rejected; the form uses this to flag fields
    /// that are probably mistyped.
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(invalid("Email cannot be empty"));
        }

        if email.len() > 254 {
            return Err(invalid("Email too long (max 254 characters)"));
        }

        let Some((local_part, domain_part)) = email.split_once('@') else {
            return Err(invalid("Email must contain @ symbol"));
        };

        if domain_part.contains('@') {
            return Err(invalid("Email must have exactly one @ symbol"));
        }

        if local_part.is_empty() || local_part.len() > 64 {
            return Err(invalid("Email local part invalid"));
        }

        if domain_part.is_empty() || !domain_part.contains('.') {
            return Err(invalid("Email domain invalid"));
        }

        Ok(())
    }

    /// Validate the SQLite database path
    pub fn validate_database_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.trim().is_empty() {
            return Err(invalid("Database path cannot be empty"));
        }

        if path_str.len() > 4096 {
            return Err(invalid("Database path too long (max 4096 characters)"));
        }

        if path.is_dir() {
            return Err(invalid(format!("Database path is a directory: {path:?}")));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
