//! Data models for scan handling and storage
//!
//! This module contains the structures shared by the parser, the record
//! store and the form layer: parsed fields, stored records and the alias
//! table that maps payload keys onto fields.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the six semantic fields a payload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Contact email address
    Gmail,
    /// Student identifier
    StudentId,
    /// Student display name
    StudentName,
    /// Class the student belongs to
    ClassName,
    /// Course the scan was taken for
    CourseName,
    /// Free-text notes
    Notes,
}

impl Field {
    /// All fields in form order.
    pub const ALL: [Self; 6] = [
        Self::Gmail,
        Self::StudentId,
        Self::StudentName,
        Self::ClassName,
        Self::CourseName,
        Self::Notes,
    ];

    /// Key spellings recognised for this field, lowercase, in precedence order.
    #[must_use]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Gmail => &["gmail", "email"],
            Self::StudentId => &["student_id", "studentid", "id"],
            Self::StudentName => &["student_name", "name", "studentname"],
            Self::ClassName => &["class_name", "class", "classname"],
            Self::CourseName => &["course_name", "course", "coursename"],
            Self::Notes => &["notes", "note", "description"],
        }
    }

    /// Resolve a payload key to a field, ignoring ASCII case and surrounding
    /// whitespace.
    #[must_use]
    pub fn from_alias(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.aliases().contains(&key.as_str()))
    }

    /// Name of the flat form field and table column.
    #[must_use]
    pub const fn form_name(self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::StudentId => "student_id",
            Self::StudentName => "student_name",
            Self::ClassName => "class_name",
            Self::CourseName => "course_name",
            Self::Notes => "notes",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_name())
    }
}

/// Fields extracted from one payload. Never persisted on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    /// Contact email address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gmail: Option<String>,
    /// Student identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    /// Student display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    /// Class name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Course name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    /// Free-text notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ParsedFields {
    /// Borrow the value of a field.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Set a field. Empty or whitespace-only values clear it.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        *self.slot_mut(field) = normalize(Some(value.into()));
    }

    /// Set a field only when it is still absent. Returns true if it was set.
    pub fn fill(&mut self, field: Field, value: &str) -> bool {
        let slot = self.slot_mut(field);
        if slot.is_some() {
            return false;
        }
        *slot = normalize(Some(value.to_string()));
        slot.is_some()
    }

    /// Clear a field.
    pub fn clear(&mut self, field: Field) {
        *self.slot_mut(field) = None;
    }

    /// True when no field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Field::ALL.into_iter().all(|field| self.get(field).is_none())
    }

    /// Number of fields carrying a value.
    #[must_use]
    pub fn populated(&self) -> usize {
        Field::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_some())
            .count()
    }

    /// Normalise every field: trim and drop empties.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for field in Field::ALL {
            let slot = self.slot_mut(field);
            *slot = normalize(slot.take());
        }
        self
    }

    const fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::Gmail => &self.gmail,
            Field::StudentId => &self.student_id,
            Field::StudentName => &self.student_name,
            Field::ClassName => &self.class_name,
            Field::CourseName => &self.course_name,
            Field::Notes => &self.notes,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Gmail => &mut self.gmail,
            Field::StudentId => &mut self.student_id,
            Field::StudentName => &mut self.student_name,
            Field::ClassName => &mut self.class_name,
            Field::CourseName => &mut self.course_name,
            Field::Notes => &mut self.notes,
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Database representation of a scan record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Database primary key
    pub id: i64,
    /// Raw decoded payload, stored in `qrcode_message`
    pub raw_text: String,
    /// Fields parsed from (or edited on top of) the payload
    #[serde(flatten)]
    pub fields: ParsedFields,
    /// Timestamp the record was inserted
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last change; equal to `created_at` since records are never edited
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new scan record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewScanRecord {
    /// Raw decoded payload (required)
    pub raw_text: String,
    /// Optional semantic fields
    pub fields: ParsedFields,
}

impl NewScanRecord {
    /// Record carrying only the raw payload.
    #[must_use]
    pub fn raw(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            fields: ParsedFields::default(),
        }
    }

    /// Record with pre-parsed fields.
    #[must_use]
    pub fn with_fields(raw_text: impl Into<String>, fields: ParsedFields) -> Self {
        Self {
            raw_text: raw_text.into(),
            fields,
        }
    }
}

/// Aggregate counters over all stored scans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Number of stored records
    pub total_scans: u64,
    /// Distinct non-null student identifiers
    pub unique_students: u64,
    /// Distinct non-null course names
    pub unique_courses: u64,
}

/// Result of a form submission, in the shape the scanner page consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    /// Whether the record was stored
    pub success: bool,
    /// Message shown on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Message shown on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Id of the stored record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl ActionResponse {
    /// Successful submission.
    #[must_use]
    pub fn saved(record_id: i64) -> Self {
        Self {
            success: true,
            message: Some("Record saved".to_string()),
            error: None,
            record_id: Some(record_id.to_string()),
        }
    }

    /// Failed submission.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            record_id: None,
        }
    }
}
