//! Editable scan form and its submission.
//!
//! After a scan, the form is pre-filled from the parser and the user may
//! correct any field before saving. Saving sends a flat
//! `application/x-www-form-urlencoded` body: `qrcode_message` plus the six
//! field names, empty strings for absent values.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::form_urlencoded;

use crate::db::Database;
use crate::models::{ActionResponse, Field, NewScanRecord, ParsedFields};
use crate::parser::{self, PayloadFormat};
use crate::validation::InputValidator;

/// Form field carrying the raw payload.
pub const MESSAGE_FIELD: &str = "qrcode_message";

/// Editable form for one scanned payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanForm {
    payload: String,
    format: Option<PayloadFormat>,
    fields: ParsedFields,
    edited: bool,
}

impl ScanForm {
    /// Form pre-filled from the parser's reading of `payload`.
    #[must_use]
    pub fn from_payload(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let classification = parser::classify(&payload);
        Self {
            payload,
            format: classification.format,
            fields: classification.fields,
            edited: false,
        }
    }

    /// Raw payload the form was built from.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Encoding the parser recognised, if any.
    #[must_use]
    pub const fn format(&self) -> Option<PayloadFormat> {
        self.format
    }

    /// Current field values.
    #[must_use]
    pub const fn fields(&self) -> &ParsedFields {
        &self.fields
    }

    /// True once the user changed a field.
    #[must_use]
    pub const fn is_edited(&self) -> bool {
        self.edited
    }

    /// Change one field. Blank values clear it.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.fields.set(field, value);
        self.edited = true;
    }

    /// Clear one field.
    pub fn clear(&mut self, field: Field) {
        self.fields.clear(field);
        self.edited = true;
    }

    /// Drop edits and go back to what the parser found.
    pub fn reset(&mut self) {
        self.fields = parser::parse(&self.payload);
        self.edited = false;
    }

    /// Non-blocking warnings about field values, e.g. a malformed email.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(email) = self.fields.get(Field::Gmail) {
            if let Err(err) = InputValidator::validate_email(email) {
                warnings.push(format!("{}: {err}", Field::Gmail));
            }
        }
        warnings
    }

    /// Flat submission for the current state of the form.
    #[must_use]
    pub fn to_submission(&self) -> ScanSubmission {
        ScanSubmission::new(&self.payload, &self.fields)
    }
}

/// Flat form submission, as posted by the scanner page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSubmission {
    /// Raw decoded payload text.
    pub qrcode_message: String,
    /// Contact email.
    pub gmail: String,
    /// Student number.
    pub student_id: String,
    /// Student display name.
    pub student_name: String,
    /// Class or homeroom.
    pub class_name: String,
    /// Course the scan belongs to.
    pub course_name: String,
    /// Free-form remarks.
    pub notes: String,
}

impl ScanSubmission {
    /// Flatten a payload and its fields; absent fields become empty strings.
    #[must_use]
    pub fn new(payload: &str, fields: &ParsedFields) -> Self {
        let value = |field| fields.get(field).unwrap_or_default().to_string();
        Self {
            qrcode_message: payload.to_string(),
            gmail: value(Field::Gmail),
            student_id: value(Field::StudentId),
            student_name: value(Field::StudentName),
            class_name: value(Field::ClassName),
            course_name: value(Field::CourseName),
            notes: value(Field::Notes),
        }
    }

    /// Decode a form-urlencoded body. Unknown keys are ignored; for repeated
    /// keys the last value wins.
    #[must_use]
    pub fn from_form_body(body: &str) -> Self {
        let mut submission = Self::default();
        for (key, value) in form_urlencoded::parse(body.as_bytes()) {
            if key == MESSAGE_FIELD {
                submission.qrcode_message = value.into_owned();
            } else if let Some(field) = Field::ALL.into_iter().find(|f| f.form_name() == key) {
                *submission.slot_mut(field) = value.into_owned();
            }
        }
        submission
    }

    /// Encode as a form-urlencoded body.
    #[must_use]
    pub fn to_form_body(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.append_pair(MESSAGE_FIELD, &self.qrcode_message);
        for field in Field::ALL {
            serializer.append_pair(field.form_name(), self.slot(field));
        }
        serializer.finish()
    }

    /// Convert to an insert payload. Empty strings become absent fields.
    #[must_use]
    pub fn into_new_record(self) -> NewScanRecord {
        let mut fields = ParsedFields::default();
        for field in Field::ALL {
            fields.set(field, self.slot(field));
        }
        NewScanRecord::with_fields(self.qrcode_message, fields)
    }

    fn slot(&self, field: Field) -> &str {
        match field {
            Field::Gmail => &self.gmail,
            Field::StudentId => &self.student_id,
            Field::StudentName => &self.student_name,
            Field::ClassName => &self.class_name,
            Field::CourseName => &self.course_name,
            Field::Notes => &self.notes,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut String {
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

/// Store a submission and report the outcome the way the scanner page expects.
///
/// Validation failures carry their message; storage failures are reported
/// with a generic message and logged. Nothing is retried.
pub fn submit(db: &Database, submission: ScanSubmission) -> ActionResponse {
    match db.insert(submission.into_new_record()) {
        Ok(record) => {
            info!(id = record.id, "Scan submission saved");
            ActionResponse::saved(record.id)
        },
        Err(err) if err.is_validation() => {
            warn!(error = %err, "Scan submission rejected");
            ActionResponse::failed(err.to_string())
        },
        Err(err) => {
            error!(error = %err, "Failed to save scan submission");
            ActionResponse::failed("Saving the record failed, please try again")
        },
    }
}

/// Decode a form body and store it.
pub fn submit_form_body(db: &Database, body: &str) -> ActionResponse {
    submit(db, ScanSubmission::from_form_body(body))
}
