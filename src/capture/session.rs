use tracing::{debug, info, warn};

use super::device::{
    BarcodeDetector, CameraDevice, Capabilities, CapabilityProvider, DetectedBarcode, DeviceAcquisitionError,
    VideoConstraints, VideoFeed,
};
use crate::metrics::MetricsCollector;

/// Where a capture session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    /// No feed, nothing requested
    Idle,
    /// Waiting for the camera
    Requesting,
    /// Feed live, polling the detector
    Scanning,
    /// A payload was decoded; the feed is released
    Found(String),
    /// Ended without a payload
    Stopped(StopReason),
}

impl CaptureState {
    /// True while the session holds, or is about to hold, the camera.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Requesting | Self::Scanning)
    }
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The user stopped it
    Cancelled,
    /// The poll budget ran out without a code
    GaveUp,
    /// The camera could not be acquired
    AcquisitionFailed(DeviceAcquisitionError),
}

/// Errors from driving a capture session
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// A session is already requesting or scanning; stop it first
    #[error("A capture session is already active")]
    AlreadyActive,

    /// The camera could not be acquired
    #[error(transparent)]
    Acquisition(#[from] DeviceAcquisitionError),

    /// The background scan task panicked or was aborted
    #[error("Scan task failed: {0}")]
    TaskFailed(String),
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Session is not scanning
    Inactive,
    /// Feed not ready; the detector was not called
    Skipped,
    /// Detector ran and found nothing
    NoMatch,
    /// Detector errored; scanning continues
    DetectionFailed,
    /// A code was decoded and the session moved to `Found`
    Found(DetectedBarcode),
}

impl PollOutcome {
    /// Label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Skipped => "skipped",
            Self::NoMatch => "no_match",
            Self::DetectionFailed => "detection_failed",
            Self::Found(_) => "found",
        }
    }
}

/// One camera scan: acquire a feed, poll until a code is found or the user
/// stops, and release the feed on every way out.
///
/// The session is stepped explicitly: each [`CaptureSession::poll`] is one
/// detection attempt, so callers decide the schedule.
pub struct CaptureSession {
    capabilities: Capabilities,
    state: CaptureState,
    feed: Option<Box<dyn VideoFeed>>,
    polls: u64,
}

impl CaptureSession {
    /// Create an idle session, probing the platform once.
    pub fn new(provider: &dyn CapabilityProvider) -> Self {
        let capabilities = provider.detect_capabilities();
        debug!(?capabilities, "Capture capabilities detected");
        Self {
            capabilities,
            state: CaptureState::Idle,
            feed: None,
            polls: 0,
        }
    }

    /// Capabilities found when the session was created.
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Current state.
    pub const fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Decoded payload, once found.
    pub fn payload(&self) -> Option<&str> {
        match &self.state {
            CaptureState::Found(payload) => Some(payload),
            _ => None,
        }
    }

    /// Detection attempts made since the feed went live. Skipped polls do not count.
    pub const fn polls(&self) -> u64 {
        self.polls
    }

    /// Whether a feed is currently held.
    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    /// Idle/Found/Stopped → Requesting. Fails fast when the platform cannot scan.
    pub fn begin_request(&mut self) -> Result<(), CaptureError> {
        if self.state.is_active() {
            return Err(CaptureError::AlreadyActive);
        }

        self.polls = 0;
        self.state = CaptureState::Requesting;
        info!("Requesting camera");

        if let Err(reason) = self.capabilities.ensure_scannable() {
            return self.complete_request(Err(reason.into()));
        }
        Ok(())
    }

    /// Deliver the outcome of the camera request.
    ///
    /// A feed that arrives after the session was stopped is released at once.
    pub fn complete_request(
        &mut self,
        result: Result<Box<dyn VideoFeed>, DeviceAcquisitionError>,
    ) -> Result<(), CaptureError> {
        if self.state != CaptureState::Requesting {
            if let Ok(mut feed) = result {
                debug!(state = ?self.state, "Camera arrived after the request ended, releasing");
                feed.stop_tracks();
            }
            return Ok(());
        }

        match result {
            Ok(feed) => {
                self.feed = Some(feed);
                self.state = CaptureState::Scanning;
                MetricsCollector::global().feed_opened();
                info!("Camera acquired, scanning");
                Ok(())
            },
            Err(err) => {
                warn!(error = %err, "Camera acquisition failed");
                self.state = CaptureState::Stopped(StopReason::AcquisitionFailed(err.clone()));
                MetricsCollector::global().record_session_end("acquisition_failed");
                Err(CaptureError::Acquisition(err))
            },
        }
    }

    /// Request the camera and wait for it.
    pub async fn start(
        &mut self,
        camera: &dyn CameraDevice,
        constraints: &VideoConstraints,
    ) -> Result<(), CaptureError> {
        self.begin_request()?;
        let result = camera.open(constraints).await;
        self.complete_request(result)
    }

    /// Run one detection attempt.
    pub async fn poll(&mut self, detector: &dyn BarcodeDetector) -> PollOutcome {
        let outcome = self.poll_once(detector).await;
        MetricsCollector::global().record_poll(outcome.label());
        outcome
    }

    async fn poll_once(&mut self, detector: &dyn BarcodeDetector) -> PollOutcome {
        if self.state != CaptureState::Scanning {
            return PollOutcome::Inactive;
        }
        let Some(feed) = self.feed.as_mut() else {
            return PollOutcome::Inactive;
        };
        if !feed.has_enough_data() {
            return PollOutcome::Skipped;
        }
        let Some(frame) = feed.capture_frame() else {
            return PollOutcome::Skipped;
        };

        self.polls += 1;
        let codes = match detector.detect(&frame).await {
            Ok(codes) => codes,
            Err(err) => {
                warn!(error = %err, poll = self.polls, "Detection attempt failed");
                return PollOutcome::DetectionFailed;
            },
        };

        let Some(code) = codes.into_iter().find(|code| !code.raw_value.is_empty()) else {
            return PollOutcome::NoMatch;
        };

        info!(poll = self.polls, format = %code.format, len = code.raw_value.len(), "Code detected");
        self.state = CaptureState::Found(code.raw_value.clone());
        self.release_feed();
        MetricsCollector::global().record_session_end("found");
        PollOutcome::Found(code)
    }

    /// Stop a requesting or scanning session. No-op otherwise.
    pub fn stop(&mut self) {
        self.end(StopReason::Cancelled, "cancelled");
    }

    /// Stop scanning because no code turned up in time. No-op unless active.
    pub fn give_up(&mut self) {
        self.end(StopReason::GaveUp, "gave_up");
    }

    fn end(&mut self, reason: StopReason, outcome: &'static str) {
        if !self.state.is_active() {
            return;
        }
        info!(polls = self.polls, ?reason, "Capture stopped");
        self.state = CaptureState::Stopped(reason);
        self.release_feed();
        MetricsCollector::global().record_session_end(outcome);
    }

    fn release_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop_tracks();
            MetricsCollector::global().feed_released();
            debug!("Video feed released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_feed();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .field("has_feed", &self.feed.is_some())
            .field("polls", &self.polls)
            .finish()
    }
}
