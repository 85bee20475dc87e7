//! Test payload generator.
//!
//! Produces unique strings to print as QR codes when trying out the scanner,
//! keeps a short newest-first history and builds image URLs for an external
//! QR rendering service.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::{Result, ScanRecordError};
use crate::metrics::MetricsCollector;

/// Base URL of the QR image rendering service.
pub const QR_RENDER_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Default number of generated payloads kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Shape of a generated payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Random v4 UUID
    Uuid,
    /// `TS-{unix millis}-{5 base36 chars}`
    Timestamp,
    /// 16 alphanumeric characters
    Random,
    /// 32 lowercase hex characters from 16 random bytes
    Secure,
    /// `{prefix}-{unix millis}-{4 base36 chars}`
    Custom(String),
}

impl PayloadKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
            Self::Random => "random",
            Self::Secure => "secure",
            Self::Custom(_) => "custom",
        }
    }

    /// Produce a fresh value of this kind at `now`.
    fn generate_value(&self, now: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        match self {
            Self::Uuid => Uuid::new_v4().to_string(),
            Self::Timestamp => format!(
                "TS-{}-{}",
                now.timestamp_millis(),
                base36_suffix(&mut rng, 5)
            ),
            Self::Random => Alphanumeric.sample_string(&mut rng, 16),
            Self::Secure => {
                let bytes: [u8; 16] = rng.gen();
                bytes.iter().map(|b| format!("{b:02x}")).collect()
            },
            Self::Custom(prefix) => format!(
                "{}-{}-{}",
                prefix.trim(),
                now.timestamp_millis(),
                base36_suffix(&mut rng, 4)
            ),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PayloadKind {
    type Err = ScanRecordError;

    /// Parses the unit kinds; `custom` needs a prefix and goes through
    /// [`PayloadKind::Custom`] directly.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(Self::Uuid),
            "timestamp" | "ts" => Ok(Self::Timestamp),
            "random" => Ok(Self::Random),
            "secure" => Ok(Self::Secure),
            other => Err(ScanRecordError::Validation(format!(
                "Unknown payload kind: {other}"
            ))),
        }
    }
}

fn base36_suffix<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}

/// One generated payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPayload {
    /// History entry id.
    pub id: Uuid,
    /// Text encoded into the QR code.
    pub value: String,
    /// When the payload was generated.
    pub created_at: DateTime<Utc>,
    /// Kind the value was generated as.
    pub kind: PayloadKind,
}

/// Generate one payload of `kind`.
///
/// A custom prefix must not be blank.
pub fn generate(kind: PayloadKind) -> Result<GeneratedPayload> {
    if let PayloadKind::Custom(prefix) = &kind {
        if prefix.trim().is_empty() {
            return Err(ScanRecordError::Validation(
                "Custom payloads need a non-empty prefix".to_string(),
            ));
        }
    }

    let created_at = Utc::now();
    let value = kind.generate_value(created_at);
    MetricsCollector::global().record_generated(kind.label());
    debug!(kind = kind.label(), value = %value, "Generated payload");

    Ok(GeneratedPayload {
        id: Uuid::new_v4(),
        value,
        created_at,
        kind,
    })
}

/// Image URL for `value` rendered as an SVG QR code of `size`×`size` pixels.
pub fn render_url(value: &str, size: u32) -> Result<Url> {
    let mut url = Url::parse(QR_RENDER_ENDPOINT)
        .map_err(|e| ScanRecordError::Other(format!("Invalid render endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("size", &format!("{size}x{size}"))
        .append_pair("data", value)
        .append_pair("format", "svg");
    Ok(url)
}

/// Newest-first history of generated payloads, capped at a fixed length
#[derive(Debug, Clone)]
pub struct GeneratorHistory {
    limit: usize,
    entries: VecDeque<GeneratedPayload>,
}

impl Default for GeneratorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl GeneratorHistory {
    /// History keeping at most `limit` entries (at least one).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            entries: VecDeque::with_capacity(limit),
        }
    }

    /// Generate a payload and put it at the front of the history.
    pub fn generate(&mut self, kind: PayloadKind) -> Result<&GeneratedPayload> {
        let payload = generate(kind)?;
        self.push(payload);
        self.latest()
            .ok_or_else(|| ScanRecordError::Other("Generator history is empty".to_string()))
    }

    /// Add an existing payload, dropping the oldest entry past the limit.
    pub fn push(&mut self, payload: GeneratedPayload) {
        self.entries.push_front(payload);
        self.entries.truncate(self.limit);
    }

    /// Most recently generated payload.
    #[must_use]
    pub fn latest(&self) -> Option<&GeneratedPayload> {
        self.entries.front()
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &GeneratedPayload> {
        self.entries.iter()
    }

    /// Number of payloads held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been generated since the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most payloads kept; older ones fall off.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Drop every held payload.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_value_is_hex() {
        let payload = generate(PayloadKind::Secure).unwrap();
        assert_eq!(payload.value.len(), 32);
        assert!(payload.value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_timestamp_value_shape() {
        let payload = generate(PayloadKind::Timestamp).unwrap();
        let parts: Vec<&str> = payload.value.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TS");
        assert_eq!(parts[1], payload.created_at.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 5);
    }

    #[test]
    fn test_blank_custom_prefix_rejected() {
        let err = generate(PayloadKind::Custom("  ".to_string())).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("UUID".parse::<PayloadKind>().unwrap(), PayloadKind::Uuid);
        assert_eq!("ts".parse::<PayloadKind>().unwrap(), PayloadKind::Timestamp);
        assert!("custom".parse::<PayloadKind>().is_err());
    }

    #[test]
    fn test_history_zero_limit_keeps_one() {
        let mut history = GeneratorHistory::new(0);
        history.generate(PayloadKind::Random).unwrap();
        history.generate(PayloadKind::Random).unwrap();
        assert_eq!(history.limit(), 1);
        assert_eq!(history.len(), 1);
    }
}
