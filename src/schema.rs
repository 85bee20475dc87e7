//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.

/// Scan records table schema
pub mod qrcode_scans {
    /// Table name
    pub const TABLE: &str = "qrcode_scans";
    /// Primary key column
    pub const ID: &str = "id";
    /// Raw decoded payload column
    pub const QRCODE_MESSAGE: &str = "qrcode_message";
    /// Contact email column
    pub const GMAIL: &str = "gmail";
    /// Student identifier column
    pub const STUDENT_ID: &str = "student_id";
    /// Student name column
    pub const STUDENT_NAME: &str = "student_name";
    /// Class name column
    pub const CLASS_NAME: &str = "class_name";
    /// Course name column
    pub const COURSE_NAME: &str = "course_name";
    /// Free-text notes column
    pub const NOTES: &str = "notes";
    /// Insert timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last change timestamp column
    pub const UPDATED_AT: &str = "updated_at";

    /// All columns in select order
    pub const COLUMNS: [&str; 10] = [
        ID,
        QRCODE_MESSAGE,
        GMAIL,
        STUDENT_ID,
        STUDENT_NAME,
        CLASS_NAME,
        COURSE_NAME,
        NOTES,
        CREATED_AT,
        UPDATED_AT,
    ];
}
