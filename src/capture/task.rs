use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::device::{BarcodeDetector, BoundingBox, CameraDevice, VideoConstraints};
use super::session::{CaptureError, CaptureSession, PollOutcome};
use crate::config::ScannerConfig;
use crate::models::ParsedFields;
use crate::parser::{self, PayloadFormat};

/// Timing of the background scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedule {
    /// Delay between the feed going live and the first poll
    pub warmup: Duration,
    /// Time between polls
    pub interval: Duration,
    /// Give up after this many ticks. `None` polls until found or cancelled.
    pub max_polls: Option<u64>,
}

impl Default for ScanSchedule {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(1000),
            interval: Duration::from_millis(100),
            max_polls: None,
        }
    }
}

impl From<&ScannerConfig> for ScanSchedule {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            warmup: Duration::from_millis(config.warmup_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        }
    }
}

/// A decoded payload together with what the parser made of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedPayload {
    /// Raw decoded text
    pub payload: String,
    /// Encoding the parser recognised
    pub format: Option<PayloadFormat>,
    /// Parsed fields, pre-filling the scan form
    pub fields: ParsedFields,
    /// Where the code was in the frame
    pub bounding_box: BoundingBox,
}

impl ScannedPayload {
    /// Parse a decoded payload.
    #[must_use]
    pub fn new(payload: String, bounding_box: BoundingBox) -> Self {
        let classification = parser::classify(&payload);
        Self {
            payload,
            format: classification.format,
            fields: classification.fields,
            bounding_box,
        }
    }
}

/// How a background scan ended
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A code was decoded
    Found(ScannedPayload),
    /// Cancelled through the task handle
    Cancelled,
    /// `max_polls` ticks passed without a code
    GaveUp {
        /// Ticks elapsed
        polls: u64,
    },
    /// The session could not start
    Failed(CaptureError),
}

/// Handle to a scan loop running on the tokio runtime.
pub struct ScanTask {
    cancel: CancellationToken,
    handle: JoinHandle<(CaptureSession, ScanOutcome)>,
}

impl ScanTask {
    /// Ask the loop to stop. The feed is released before the task ends.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the loop has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop and get the session back.
    pub async fn join(self) -> Result<(CaptureSession, ScanOutcome), CaptureError> {
        self.handle
            .await
            .map_err(|err| CaptureError::TaskFailed(err.to_string()))
    }
}

/// Start a scan in the background: acquire the camera, wait out the warmup,
/// then poll on every tick until a code is found, the task is cancelled, or
/// `max_polls` is reached.
///
/// Cancelling `parent` also cancels the scan.
pub fn spawn_scan(
    session: CaptureSession,
    camera: Arc<dyn CameraDevice>,
    detector: Arc<dyn BarcodeDetector>,
    constraints: VideoConstraints,
    schedule: ScanSchedule,
    parent: &CancellationToken,
) -> ScanTask {
    let cancel = parent.child_token();
    let handle = tokio::spawn(scan_loop(
        session,
        camera,
        detector,
        constraints,
        schedule,
        cancel.clone(),
    ));
    ScanTask { cancel, handle }
}

async fn scan_loop(
    mut session: CaptureSession,
    camera: Arc<dyn CameraDevice>,
    detector: Arc<dyn BarcodeDetector>,
    constraints: VideoConstraints,
    schedule: ScanSchedule,
    cancel: CancellationToken,
) -> (CaptureSession, ScanOutcome) {
    if let Err(err) = session.begin_request() {
        return (session, ScanOutcome::Failed(err));
    }

    // Every wait below checks the token first, so a cancelled scan never
    // reports a payload found after the cancel.
    let acquired = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = camera.open(&constraints) => Some(result),
    };
    let Some(acquired) = acquired else {
        return cancelled(session);
    };
    if let Err(err) = session.complete_request(acquired) {
        return (session, ScanOutcome::Failed(err));
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => return cancelled(session),
        () = tokio::time::sleep(schedule.warmup) => {},
    }

    let mut ticker = tokio::time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return cancelled(session),
            _ = ticker.tick() => {},
        }
        ticks += 1;

        // The detector may be slow; a cancel during detection drops the attempt.
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            outcome = session.poll(detector.as_ref()) => Some(outcome),
        };
        let Some(outcome) = polled else {
            return cancelled(session);
        };

        match outcome {
            PollOutcome::Found(code) => {
                let scanned = ScannedPayload::new(code.raw_value, code.bounding_box);
                info!(ticks, format = ?scanned.format, "Scan finished with a payload");
                return (session, ScanOutcome::Found(scanned));
            },
            PollOutcome::Inactive => {
                warn!(state = ?session.state(), "Session left scanning unexpectedly");
                return (session, ScanOutcome::Cancelled);
            },
            other => debug!(ticks, outcome = other.label(), "Poll"),
        }

        if schedule.max_polls.is_some_and(|max| ticks >= max) {
            info!(ticks, "No code found, giving up");
            session.give_up();
            return (session, ScanOutcome::GaveUp { polls: ticks });
        }
    }
}

fn cancelled(mut session: CaptureSession) -> (CaptureSession, ScanOutcome) {
    session.stop();
    (session, ScanOutcome::Cancelled)
}
