//! Platform capabilities the capture loop is built on.
//!
//! The camera, its video feed and the barcode detector are supplied by the
//! host platform. This module only describes them; nothing here decodes
//! images.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format name reported by detectors for QR codes.
pub const QR_CODE_FORMAT: &str = "qr_code";

/// Why a capability is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The platform exposes no media-device API
    NoMediaDevices,
    /// The platform has no barcode detector
    NoBarcodeDetector,
    /// Camera access requires a secure (https or localhost) context
    InsecureContext,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoMediaDevices => "this browser has no camera support",
            Self::NoBarcodeDetector => "this browser has no barcode detector",
            Self::InsecureContext => "camera access requires https or localhost",
        };
        f.write_str(text)
    }
}

/// Whether one capability can be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    /// Ready to use
    Available,
    /// Missing, with the reason
    Unavailable(UnavailableReason),
}

impl Availability {
    /// True when the capability can be used.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Result of probing the platform once at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Camera / media-device access
    pub camera: Availability,
    /// Barcode detection
    pub detector: Availability,
}

impl Capabilities {
    /// Everything present.
    #[must_use]
    pub const fn available() -> Self {
        Self {
            camera: Availability::Available,
            detector: Availability::Available,
        }
    }

    /// Check that both camera and detector are usable.
    pub const fn ensure_scannable(&self) -> Result<(), UnavailableReason> {
        if let Availability::Unavailable(reason) = self.camera {
            return Err(reason);
        }
        if let Availability::Unavailable(reason) = self.detector {
            return Err(reason);
        }
        Ok(())
    }
}

/// Source of platform capabilities.
#[cfg_attr(test, mockall::automock)]
pub trait CapabilityProvider {
    /// Report what the platform offers. Called once per capture session.
    fn detect_capabilities(&self) -> Capabilities;
}

impl CapabilityProvider for Capabilities {
    fn detect_capabilities(&self) -> Capabilities {
        *self
    }
}

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera
    Environment,
    /// Front camera
    User,
}

/// Requested video feed shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Preferred camera
    pub facing: FacingMode,
    /// Preferred width in pixels
    pub ideal_width: u32,
    /// Preferred height in pixels
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// One sampled video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel data in whatever layout the platform detector expects
    pub data: Vec<u8>,
}

/// A live video feed. Dropping the feed does not stop the camera; the
/// owner must call [`VideoFeed::stop_tracks`].
pub trait VideoFeed: Send {
    /// True once enough frames are buffered to sample from.
    fn has_enough_data(&self) -> bool;

    /// Copy out the current frame.
    fn capture_frame(&mut self) -> Option<Frame>;

    /// Stop every underlying track and release the device.
    fn stop_tracks(&mut self);
}

/// Camera access
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Ask for a video feed. May prompt the user for permission.
    async fn open(&self, constraints: &VideoConstraints) -> Result<Box<dyn VideoFeed>, DeviceAcquisitionError>;
}

/// Failure to acquire the camera. Never fatal; the user may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceAcquisitionError {
    /// The user or platform refused camera access
    #[error("Camera permission was denied; allow camera access in the browser settings")]
    PermissionDenied,

    /// No camera is attached
    #[error("No camera device was found")]
    DeviceNotFound,

    /// Another application holds the camera
    #[error("The camera is being used by another application")]
    DeviceBusy,

    /// Camera scanning cannot work on this platform
    #[error("Camera scanning is not supported: {0}")]
    Unsupported(String),

    /// Anything the platform reported that fits none of the above
    #[error("Camera error: {0}")]
    Other(String),
}

impl DeviceAcquisitionError {
    /// Categorise a platform error by its name (`NotAllowedError`, ...).
    #[must_use]
    pub fn from_platform(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => Self::DeviceNotFound,
            "NotReadableError" | "TrackStartError" | "AbortError" => Self::DeviceBusy,
            "NotSupportedError" | "TypeError" => Self::Unsupported(message.to_string()),
            _ => Self::Other(message.to_string()),
        }
    }

    /// Text to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<UnavailableReason> for DeviceAcquisitionError {
    fn from(reason: UnavailableReason) -> Self {
        Self::Unsupported(reason.to_string())
    }
}

/// Axis-aligned box around a detected code, in frame pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl BoundingBox {
    /// Flip horizontally, for drawing over a mirrored (user-facing) preview.
    #[must_use]
    pub fn mirrored(self, frame_width: f64) -> Self {
        Self {
            x: frame_width - self.x - self.width,
            ..self
        }
    }
}

/// A code found in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedBarcode {
    /// Decoded text
    pub raw_value: String,
    /// Location in the frame
    pub bounding_box: BoundingBox,
    /// Symbology, e.g. [`QR_CODE_FORMAT`]
    pub format: String,
}

impl DetectedBarcode {
    /// QR code with an empty bounding box.
    #[must_use]
    pub fn qr(raw_value: impl Into<String>) -> Self {
        Self {
            raw_value: raw_value.into(),
            bounding_box: BoundingBox::default(),
            format: QR_CODE_FORMAT.to_string(),
        }
    }
}

/// A single detection attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Barcode detection failed: {0}")]
pub struct DetectionError(pub String);

/// Platform barcode detector
#[async_trait]
pub trait BarcodeDetector: Send + Sync {
    /// Look for codes in one frame.
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectedBarcode>, DetectionError>;
}
