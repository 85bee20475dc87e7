//! Camera capture loop.
//!
//! [`CaptureSession`] is the state machine
//! (`Idle → Requesting → Scanning → Found`, or `Stopped`), stepped one poll at
//! a time. [`spawn_scan`] drives a session on a fixed tick in a tokio task and
//! hands back a [`ScanTask`] that can be cancelled and joined.

pub mod device;
/// Session state machine and poll outcomes.
pub mod session;
/// Tick-driven scan task with cancellation.
pub mod task;

pub use device::{
    Availability, BarcodeDetector, BoundingBox, CameraDevice, Capabilities, CapabilityProvider, DetectedBarcode,
    DetectionError, DeviceAcquisitionError, FacingMode, Frame, UnavailableReason, VideoConstraints, VideoFeed,
    QR_CODE_FORMAT,
};
pub use session::{CaptureError, CaptureSession, CaptureState, PollOutcome, StopReason};
pub use task::{spawn_scan, ScanOutcome, ScanSchedule, ScanTask, ScannedPayload};
