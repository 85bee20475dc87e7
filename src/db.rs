use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::{NewScanRecord, ParsedFields, ScanRecord, ScanStats};
use crate::schema::qrcode_scans;
use crate::validation::InputValidator;

/// Pool of SQLite connections.
pub type DbPool = Pool<SqliteConnectionManager>;
/// Connection checked out of [`DbPool`].
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Record store for scan records. Append-only: records are never updated or deleted.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `path` with default pool settings
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, &DatabaseConfig::default())
    }

    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>, config: &DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        InputValidator::validate_database_path(path)?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Set up connection manager and pool
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path = %path.display(), "Record store ready");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!(
            "../migrations/2025-07-01-000000_create_qrcode_scans/up.sql"
        ))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Store one scan. `raw_text` is required; empty semantic fields are stored as NULL.
    pub fn insert(&self, new_record: NewScanRecord) -> Result<ScanRecord> {
        if let Err(err) = InputValidator::validate_raw_text(&new_record.raw_text) {
            warn!(error = %err, "Rejected scan record");
            MetricsCollector::global().record_error("validation", "insert");
            return Err(err);
        }

        let timer = MetricsTimer::new("insert");
        let result = self.insert_validated(new_record);
        timer.finish(result.is_ok());

        if let Ok(record) = &result {
            MetricsCollector::global().record_insert();
            debug!(id = record.id, "Scan record stored");
        }
        result
    }

    fn insert_validated(&self, new_record: NewScanRecord) -> Result<ScanRecord> {
        let conn = self.get_connection()?;
        let fields = sanitize_fields(new_record.fields);
        let now = Utc::now();

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                qrcode_scans::TABLE,
                qrcode_scans::QRCODE_MESSAGE,
                qrcode_scans::GMAIL,
                qrcode_scans::STUDENT_ID,
                qrcode_scans::STUDENT_NAME,
                qrcode_scans::CLASS_NAME,
                qrcode_scans::COURSE_NAME,
                qrcode_scans::NOTES,
                qrcode_scans::CREATED_AT,
                qrcode_scans::UPDATED_AT
            ),
            params![
                new_record.raw_text,
                fields.gmail,
                fields.student_id,
                fields.student_name,
                fields.class_name,
                fields.course_name,
                fields.notes,
                now,
                now
            ],
        )?;

        // Get the last inserted ID
        let id = conn.last_insert_rowid();

        Ok(ScanRecord {
            id,
            raw_text: new_record.raw_text,
            fields,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a scan record by ID
    pub fn get(&self, id: i64) -> Result<Option<ScanRecord>> {
        let conn = self.get_connection()?;

        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    qrcode_scans::COLUMNS.join(", "),
                    qrcode_scans::TABLE,
                    qrcode_scans::ID
                ),
                params![id],
                map_scan_record,
            )
            .optional()?;

        Ok(record)
    }

    /// Most recent records first, paged by `limit` and `offset`
    pub fn list_recent(&self, limit: u32, offset: u32) -> Result<Vec<ScanRecord>> {
        InputValidator::validate_list_limit(limit)?;
        let timer = MetricsTimer::new("list_recent");
        let result = self.query_records(
            "",
            params![i64::from(limit), i64::from(offset)],
            " LIMIT ? OFFSET ?",
        );
        timer.finish(result.is_ok());
        result
    }

    /// All records for one student, most recent first
    pub fn list_by_student_id(&self, student_id: &str) -> Result<Vec<ScanRecord>> {
        let timer = MetricsTimer::new("list_by_student_id");
        let result = self.query_records(
            &format!(" WHERE {} = ?", qrcode_scans::STUDENT_ID),
            params![student_id.trim()],
            "",
        );
        timer.finish(result.is_ok());
        result
    }

    /// All records for one course, most recent first
    pub fn list_by_course(&self, course_name: &str) -> Result<Vec<ScanRecord>> {
        let timer = MetricsTimer::new("list_by_course");
        let result = self.query_records(
            &format!(" WHERE {} = ?", qrcode_scans::COURSE_NAME),
            params![course_name.trim()],
            "",
        );
        timer.finish(result.is_ok());
        result
    }

    /// Totals over all records
    pub fn stats(&self) -> Result<ScanStats> {
        let timer = MetricsTimer::new("stats");
        let result = self.query_stats();
        timer.finish(result.is_ok());
        result
    }

    fn query_stats(&self) -> Result<ScanStats> {
        let conn = self.get_connection()?;

        // COUNT(DISTINCT col) skips NULLs, so absent ids and courses are not counted.
        let (total, students, courses): (i64, i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT {}), COUNT(DISTINCT {}) FROM {}",
                qrcode_scans::STUDENT_ID,
                qrcode_scans::COURSE_NAME,
                qrcode_scans::TABLE
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(ScanStats {
            total_scans: total.unsigned_abs(),
            unique_students: students.unsigned_abs(),
            unique_courses: courses.unsigned_abs(),
        })
    }

    fn query_records(&self, filter: &str, params: &[&dyn ToSql], tail: &str) -> Result<Vec<ScanRecord>> {
        let conn = self.get_connection()?;

        let query = format!(
            "SELECT {} FROM {}{} ORDER BY {} DESC, {} DESC{}",
            qrcode_scans::COLUMNS.join(", "),
            qrcode_scans::TABLE,
            filter,
            qrcode_scans::CREATED_AT,
            qrcode_scans::ID,
            tail
        );

        let mut stmt = conn.prepare(&query)?;
        let record_iter = stmt.query_map(params, map_scan_record)?;

        let mut results = Vec::new();
        for record in record_iter {
            results.push(record?);
        }

        Ok(results)
    }
}

/// 1-based page number to row offset
pub fn page_offset(page: u32, page_size: u32) -> Result<u32> {
    InputValidator::validate_page(page)?;
    InputValidator::validate_list_limit(page_size)?;
    (page - 1).checked_mul(page_size).ok_or_else(|| {
        crate::error::ScanRecordError::Validation(format!("Page {page} is out of range"))
    })
}

fn sanitize_fields(fields: ParsedFields) -> ParsedFields {
    let sanitize = |value: Option<String>| value.map(|v| InputValidator::sanitize_text(&v));
    ParsedFields {
        gmail: sanitize(fields.gmail),
        student_id: sanitize(fields.student_id),
        student_name: sanitize(fields.student_name),
        class_name: sanitize(fields.class_name),
        course_name: sanitize(fields.course_name),
        notes: sanitize(fields.notes),
    }
    .normalized()
}

/// Map a database row to a ScanRecord
fn map_scan_record(row: &Row) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        id: row.get(qrcode_scans::ID)?,
        raw_text: row.get(qrcode_scans::QRCODE_MESSAGE)?,
        fields: ParsedFields {
            gmail: row.get(qrcode_scans::GMAIL)?,
            student_id: row.get(qrcode_scans::STUDENT_ID)?,
            student_name: row.get(qrcode_scans::STUDENT_NAME)?,
            class_name: row.get(qrcode_scans::CLASS_NAME)?,
            course_name: row.get(qrcode_scans::COURSE_NAME)?,
            notes: row.get(qrcode_scans::NOTES)?,
        },
        created_at: row.get(qrcode_scans::CREATED_AT)?,
        updated_at: row.get(qrcode_scans::UPDATED_AT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 20).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 40);
        assert!(page_offset(0, 20).is_err());
        assert!(page_offset(2, 0).is_err());
    }

    #[test]
    fn test_sanitize_fields_drops_blank_and_control_chars() {
        let fields = sanitize_fields(ParsedFields {
            student_name: Some("Amy\u{7}".to_string()),
            notes: Some("\u{0}  ".to_string()),
            ..ParsedFields::default()
        });
        assert_eq!(fields.student_name.as_deref(), Some("Amy"));
        assert_eq!(fields.notes, None);
    }
}
