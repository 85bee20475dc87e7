//! Payload interpretation.
//!
//! A scanned payload is plain text in one of several loose encodings. The
//! parser tries them in a fixed order and keeps the first one that yields
//! at least one field:
//!
//! 1. a JSON object,
//! 2. a URL or `key=value&key=value` query string,
//! 3. a delimited line (`|`, then `,`, then `;`),
//! 4. `key: value` / `key=value` lines.
//!
//! Parsing never fails. Text that matches none of the encodings produces
//! an empty [`ParsedFields`]; the caller keeps the raw payload either way.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::metrics::MetricsCollector;
use crate::models::{Field, ParsedFields};

/// Separators for delimited payloads, highest priority first.
const SEPARATORS: [char; 3] = ['|', ',', ';'];

/// Minimum length of an all-digit segment taken as a student id.
const MIN_ID_DIGITS: usize = 6;

/// Encoding a payload was recognised as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// JSON object literal
    Structured,
    /// URL or form-urlencoded query
    QueryString,
    /// Values separated by `|`, `,` or `;`
    Delimited,
    /// One `key: value` pair per line
    KeyValueLines,
}

impl PayloadFormat {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::QueryString => "query_string",
            Self::Delimited => "delimited",
            Self::KeyValueLines => "key_value_lines",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parser output together with the encoding that produced it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Matching encoding, `None` when nothing matched
    pub format: Option<PayloadFormat>,
    /// Extracted fields
    pub fields: ParsedFields,
}

/// Extract fields from a payload. See the module docs for the order of attempts.
#[must_use]
pub fn parse(raw: &str) -> ParsedFields {
    classify(raw).fields
}

/// Extract fields from a payload and report which encoding matched.
#[must_use]
pub fn classify(raw: &str) -> Classification {
    let strategies: [(PayloadFormat, fn(&str) -> Option<ParsedFields>); 4] = [
        (PayloadFormat::Structured, parse_structured),
        (PayloadFormat::QueryString, parse_query_string),
        (PayloadFormat::Delimited, parse_delimited),
        (PayloadFormat::KeyValueLines, parse_key_value_lines),
    ];

    for (format, strategy) in strategies {
        match strategy(raw) {
            Some(fields) if !fields.is_empty() => {
                debug!(format = %format, populated = fields.populated(), "Payload classified");
                MetricsCollector::global().record_parse(Some(format));
                return Classification {
                    format: Some(format),
                    fields,
                };
            },
            _ => trace!(format = %format, "Payload did not match"),
        }
    }

    debug!(len = raw.len(), "Payload has no recognisable structure");
    MetricsCollector::global().record_parse(None);
    Classification::default()
}

/// Map `(key, value)` pairs through the alias table. For each field the
/// earliest alias in the table wins, regardless of pair order.
fn from_pairs<K, V, I>(pairs: I) -> ParsedFields
where
    K: AsRef<str>,
    V: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut candidates: Vec<(Field, usize, String)> = Vec::new();
    for (key, value) in pairs {
        let key = key.as_ref().trim().to_ascii_lowercase();
        let value = value.as_ref().trim();
        if value.is_empty() {
            continue;
        }
        if let Some(field) = Field::from_alias(&key) {
            let rank = field
                .aliases()
                .iter()
                .position(|alias| *alias == key)
                .unwrap_or(usize::MAX);
            candidates.push((field, rank, value.to_string()));
        }
    }

    // Stable sort keeps payload order among equal aliases.
    candidates.sort_by_key(|(_, rank, _)| *rank);
    let mut fields = ParsedFields::default();
    for (field, _, value) in candidates {
        fields.fill(field, &value);
    }
    fields
}

fn parse_structured(raw: &str) -> Option<ParsedFields> {
    let Value::Object(map) = serde_json::from_str::<Value>(raw.trim()).ok()? else {
        return None;
    };

    let pairs = map.into_iter().filter_map(|(key, value)| {
        let text = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some((key, text))
    });
    Some(from_pairs(pairs))
}

fn parse_query_string(raw: &str) -> Option<ParsedFields> {
    let trimmed = raw.trim();
    // Form-urlencoded data never carries raw line breaks.
    if !trimmed.contains('=') || is_multi_line(trimmed) {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        let url = Url::parse(trimmed).ok()?;
        return Some(from_pairs(url.query_pairs()));
    }

    let query = trimmed.split_once('?').map_or(trimmed, |(_, rest)| rest);
    let query = query.split_once('#').map_or(query, |(head, _)| head);
    Some(from_pairs(url::form_urlencoded::parse(query.as_bytes())))
}

fn parse_delimited(raw: &str) -> Option<ParsedFields> {
    let raw = raw.trim();
    if is_multi_line(raw) {
        return None;
    }
    let separator = SEPARATORS.into_iter().find(|sep| raw.contains(*sep))?;
    let segments: Vec<&str> = raw.split(separator).map(str::trim).collect();

    let mut fields = ParsedFields::default();
    let mut anchored = false;
    let mut first_is_anchor = false;

    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let assigned = if let Some((field, value)) = keyed_segment(segment) {
            fields.fill(field, value);
            true
        } else if segment.contains('@') {
            fields.fill(Field::Gmail, segment);
            true
        } else if is_student_id(segment) {
            fields.fill(Field::StudentId, segment);
            true
        } else {
            false
        };

        anchored |= assigned;
        if index == 0 {
            first_is_anchor = assigned;
        }
    }

    // A bare first segment is only a name when something else in the line
    // proved it is a record and not prose.
    if anchored && !first_is_anchor {
        if let Some(first) = segments.first().filter(|s| !s.is_empty()) {
            fields.fill(Field::StudentName, first);
        }
    }

    Some(fields)
}

fn parse_key_value_lines(raw: &str) -> Option<ParsedFields> {
    let pairs = raw.lines().filter_map(split_key_value);
    Some(from_pairs(pairs))
}

/// Split `key: value` or `key=value` at whichever separator comes first.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let at = line.find([':', '='])?;
    let (key, value) = (line[..at].trim(), line[at + 1..].trim());
    if key.is_empty() || value.is_empty() {
        None
    } else {
        Some((key, value))
    }
}

fn is_multi_line(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

fn keyed_segment(segment: &str) -> Option<(Field, &str)> {
    let (key, value) = split_key_value(segment)?;
    Field::from_alias(key).map(|field| (field, value))
}

fn is_student_id(segment: &str) -> bool {
    segment.len() >= MIN_ID_DIGITS && segment.bytes().all(|b| b.is_ascii_digit())
}
