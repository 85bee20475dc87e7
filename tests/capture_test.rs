//! Tests for the capture session state machine and the background scan loop

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use qrcode_scan_records::capture::{
    spawn_scan, BarcodeDetector, CameraDevice, Capabilities, CaptureError, CaptureSession, CaptureState,
    DetectedBarcode, DetectionError, DeviceAcquisitionError, Frame, PollOutcome, ScanOutcome, ScanSchedule,
    StopReason, VideoConstraints, VideoFeed,
};
use qrcode_scan_records::parser::PayloadFormat;

#[derive(Clone, Default)]
struct FeedTracker {
    ready: Arc<AtomicBool>,
    releases: Arc<AtomicUsize>,
    frames: Arc<AtomicUsize>,
}

impl FeedTracker {
    fn ready() -> Self {
        let tracker = Self::default();
        tracker.ready.store(true, Ordering::SeqCst);
        tracker
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

struct FakeFeed {
    tracker: FeedTracker,
}

impl VideoFeed for FakeFeed {
    fn has_enough_data(&self) -> bool {
        self.tracker.ready.load(Ordering::SeqCst)
    }

    fn capture_frame(&mut self) -> Option<Frame> {
        self.tracker.frames.fetch_add(1, Ordering::SeqCst);
        Some(Frame {
            width: 4,
            height: 4,
            data: vec![0; 16],
        })
    }

    fn stop_tracks(&mut self) {
        self.tracker.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn feed(tracker: &FeedTracker) -> Box<dyn VideoFeed> {
    Box::new(FakeFeed { tracker: tracker.clone() })
}

struct FakeCamera {
    tracker: FeedTracker,
    failure: Option<DeviceAcquisitionError>,
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self, _constraints: &VideoConstraints) -> Result<Box<dyn VideoFeed>, DeviceAcquisitionError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(feed(&self.tracker)),
        }
    }
}

/// Finds `payload` on call number `found_on` (1-based); fails on the calls listed in `fail_on`.
/// Each call takes `delay` before answering.
struct ScriptedDetector {
    calls: AtomicUsize,
    found_on: Option<usize>,
    fail_on: Vec<usize>,
    payload: String,
    delay: Duration,
}

impl ScriptedDetector {
    fn finds_on(call: usize, payload: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            found_on: Some(call),
            fail_on: Vec::new(),
            payload: payload.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn never() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            found_on: None,
            fail_on: Vec::new(),
            payload: String::new(),
            delay: Duration::ZERO,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BarcodeDetector for ScriptedDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectedBarcode>, DetectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.contains(&call) {
            return Err(DetectionError("frame decode failed".to_string()));
        }
        if self.found_on == Some(call) {
            return Ok(vec![DetectedBarcode::qr(self.payload.clone())]);
        }
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_found_on_sixth_poll_releases_once() {
    let tracker = FeedTracker::ready();
    let camera = FakeCamera {
        tracker: tracker.clone(),
        failure: None,
    };
    let detector = ScriptedDetector::finds_on(6, "X");

    let mut session = CaptureSession::new(&Capabilities::available());
    session
        .start(&camera, &VideoConstraints::default())
        .await
        .expect("camera should open");
    assert_eq!(session.state(), &CaptureState::Scanning);
    assert!(session.has_feed());

    for _ in 0..5 {
        assert_eq!(session.poll(&detector).await, PollOutcome::NoMatch);
    }
    let outcome = session.poll(&detector).await;
    assert!(matches!(outcome, PollOutcome::Found(ref code) if code.raw_value == "X"));

    assert_eq!(session.state(), &CaptureState::Found("X".to_string()));
    assert_eq!(session.payload(), Some("X"));
    assert_eq!(session.polls(), 6);
    assert!(!session.has_feed());
    assert_eq!(tracker.releases(), 1);

    // Nothing further happens after a find.
    assert_eq!(session.poll(&detector).await, PollOutcome::Inactive);
    session.stop();
    drop(session);
    assert_eq!(tracker.releases(), 1);
    assert_eq!(detector.calls(), 6);
}

#[tokio::test]
async fn test_unready_feed_skips_detector() {
    let tracker = FeedTracker::default();
    let detector = ScriptedDetector::finds_on(1, "X");

    let mut session = CaptureSession::new(&Capabilities::available());
    session.begin_request().unwrap();
    session.complete_request(Ok(feed(&tracker))).unwrap();

    for _ in 0..3 {
        assert_eq!(session.poll(&detector).await, PollOutcome::Skipped);
    }
    assert_eq!(detector.calls(), 0);
    assert_eq!(session.polls(), 0);

    tracker.ready.store(true, Ordering::SeqCst);
    assert!(matches!(session.poll(&detector).await, PollOutcome::Found(_)));
    assert_eq!(tracker.releases(), 1);
}

#[tokio::test]
async fn test_detection_errors_do_not_stop_scanning() {
    let tracker = FeedTracker::ready();
    let detector = ScriptedDetector {
        fail_on: vec![1, 2],
        ..ScriptedDetector::finds_on(3, "after errors")
    };

    let mut session = CaptureSession::new(&Capabilities::available());
    session.begin_request().unwrap();
    session.complete_request(Ok(feed(&tracker))).unwrap();

    assert_eq!(session.poll(&detector).await, PollOutcome::DetectionFailed);
    assert_eq!(session.poll(&detector).await, PollOutcome::DetectionFailed);
    assert_eq!(session.state(), &CaptureState::Scanning);
    assert!(matches!(session.poll(&detector).await, PollOutcome::Found(_)));
    assert_eq!(session.payload(), Some("after errors"));
}

#[tokio::test]
async fn test_stop_releases_feed_once() {
    let tracker = FeedTracker::ready();
    let mut session = CaptureSession::new(&Capabilities::available());
    session.begin_request().unwrap();
    session.complete_request(Ok(feed(&tracker))).unwrap();

    session.stop();
    session.stop();
    assert_eq!(session.state(), &CaptureState::Stopped(StopReason::Cancelled));
    assert_eq!(session.poll(&ScriptedDetector::never()).await, PollOutcome::Inactive);
    drop(session);
    assert_eq!(tracker.releases(), 1);
}

#[test]
fn test_drop_while_scanning_releases_feed() {
    let tracker = FeedTracker::ready();
    {
        let mut session = CaptureSession::new(&Capabilities::available());
        session.begin_request().unwrap();
        session.complete_request(Ok(feed(&tracker))).unwrap();
    }
    assert_eq!(tracker.releases(), 1);
}

#[test]
fn test_feed_arriving_after_stop_is_released() {
    let tracker = FeedTracker::ready();
    let mut session = CaptureSession::new(&Capabilities::available());
    session.begin_request().unwrap();
    session.stop();

    session.complete_request(Ok(feed(&tracker))).unwrap();
    assert_eq!(tracker.releases(), 1);
    assert!(!session.has_feed());
    assert_eq!(session.state(), &CaptureState::Stopped(StopReason::Cancelled));
}

#[test]
fn test_second_request_while_active_is_rejected() {
    let mut session = CaptureSession::new(&Capabilities::available());
    session.begin_request().unwrap();
    assert_eq!(session.begin_request(), Err(CaptureError::AlreadyActive));
    assert_eq!(session.state(), &CaptureState::Requesting);
}

#[tokio::test]
async fn test_permission_denied_stops_session() {
    let tracker = FeedTracker::ready();
    let camera = FakeCamera {
        tracker: tracker.clone(),
        failure: Some(DeviceAcquisitionError::PermissionDenied),
    };

    let mut session = CaptureSession::new(&Capabilities::available());
    let err = session
        .start(&camera, &VideoConstraints::default())
        .await
        .unwrap_err();
    assert_eq!(err, CaptureError::Acquisition(DeviceAcquisitionError::PermissionDenied));
    assert_eq!(
        session.state(),
        &CaptureState::Stopped(StopReason::AcquisitionFailed(DeviceAcquisitionError::PermissionDenied))
    );
    assert!(!session.has_feed());
    assert_eq!(tracker.releases(), 0);

    // The user may retry after a failure.
    assert!(session.begin_request().is_ok());
}

fn fast_schedule(max_polls: Option<u64>) -> ScanSchedule {
    ScanSchedule {
        warmup: Duration::ZERO,
        interval: Duration::from_millis(1),
        max_polls,
    }
}

#[tokio::test]
async fn test_spawned_scan_finds_and_parses_payload() {
    let tracker = FeedTracker::ready();
    let camera = Arc::new(FakeCamera {
        tracker: tracker.clone(),
        failure: None,
    });
    let detector = Arc::new(ScriptedDetector::finds_on(3, "王小明|110123456|test@example.com"));

    let task = spawn_scan(
        CaptureSession::new(&Capabilities::available()),
        camera,
        detector.clone(),
        VideoConstraints::default(),
        fast_schedule(None),
        &CancellationToken::new(),
    );
    let (session, outcome) = task.join().await.unwrap();

    let ScanOutcome::Found(scanned) = outcome else {
        panic!("expected a payload, got {outcome:?}");
    };
    assert_eq!(scanned.format, Some(PayloadFormat::Delimited));
    assert_eq!(scanned.fields.student_id.as_deref(), Some("110123456"));
    assert_eq!(session.payload(), Some("王小明|110123456|test@example.com"));
    assert_eq!(detector.calls(), 3);
    assert_eq!(tracker.releases(), 1);
}

#[tokio::test]
async fn test_spawned_scan_cancel_releases_feed() {
    let tracker = FeedTracker::ready();
    let camera = Arc::new(FakeCamera {
        tracker: tracker.clone(),
        failure: None,
    });

    let task = spawn_scan(
        CaptureSession::new(&Capabilities::available()),
        camera,
        Arc::new(ScriptedDetector::never()),
        VideoConstraints::default(),
        fast_schedule(None),
        &CancellationToken::new(),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    task.cancel();
    let (session, outcome) = task.join().await.unwrap();

    assert_eq!(outcome, ScanOutcome::Cancelled);
    assert_eq!(session.state(), &CaptureState::Stopped(StopReason::Cancelled));
    assert_eq!(tracker.releases(), 1);
}

#[tokio::test]
async fn test_parent_token_cancels_scan() {
    let parent = CancellationToken::new();
    parent.cancel();

    let task = spawn_scan(
        CaptureSession::new(&Capabilities::available()),
        Arc::new(FakeCamera {
            tracker: FeedTracker::ready(),
            failure: None,
        }),
        Arc::new(ScriptedDetector::never()),
        VideoConstraints::default(),
        fast_schedule(None),
        &parent,
    );
    let (_, outcome) = task.join().await.unwrap();
    assert_eq!(outcome, ScanOutcome::Cancelled);
}

#[tokio::test]
async fn test_spawned_scan_gives_up_after_max_polls() {
    let tracker = FeedTracker::ready();
    let detector = Arc::new(ScriptedDetector::never());

    let task = spawn_scan(
        CaptureSession::new(&Capabilities::available()),
        Arc::new(FakeCamera {
            tracker: tracker.clone(),
            failure: None,
        }),
        detector.clone(),
        VideoConstraints::default(),
        fast_schedule(Some(4)),
        &CancellationToken::new(),
    );
    let (session, outcome) = task.join().await.unwrap();

    assert_eq!(outcome, ScanOutcome::GaveUp { polls: 4 });
    assert_eq!(session.state(), &CaptureState::Stopped(StopReason::GaveUp));
    assert_eq!(detector.calls(), 4);
    assert!(!session.has_feed());
    assert_eq!(tracker.releases(), 1);
}

#[tokio::test]
async fn test_spawned_scan_reports_acquisition_failure() {
    let task = spawn_scan(
        CaptureSession::new(&Capabilities::available()),
        Arc::new(FakeCamera {
            tracker: FeedTracker::ready(),
            failure: Some(DeviceAcquisitionError::DeviceBusy),
        }),
        Arc::new(ScriptedDetector::never()),
        VideoConstraints::default(),
        fast_schedule(None),
        &CancellationToken::new(),
    );
    let (_, outcome) = task.join().await.unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Failed(CaptureError::Acquisition(DeviceAcquisitionError::DeviceBusy))
    );
}

#[tokio::test]
async fn test_cancel_during_slow_detection_never_reports_found() {
    for _ in 0..10 {
        let tracker = FeedTracker::ready();
        let detector = Arc::new(ScriptedDetector {
            delay: Duration::from_millis(30),
            ..ScriptedDetector::finds_on(1, "too late")
        });

        let task = spawn_scan(
            CaptureSession::new(&Capabilities::available()),
            Arc::new(FakeCamera {
                tracker: tracker.clone(),
                failure: None,
            }),
            detector.clone(),
            VideoConstraints::default(),
            fast_schedule(None),
            &CancellationToken::new(),
        );

        // The first detection is still running when the cancel lands.
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.cancel();
        let (session, outcome) = task.join().await.unwrap();

        assert_eq!(outcome, ScanOutcome::Cancelled);
        assert_eq!(session.state(), &CaptureState::Stopped(StopReason::Cancelled));
        assert_eq!(session.payload(), None);
        assert_eq!(detector.calls(), 1);
        assert_eq!(tracker.releases(), 1);
    }
}

#[tokio::test]
async fn test_cancel_wins_over_ready_ticks() {
    // A detector slower than the tick keeps the ticker permanently ready.
    let tracker = FeedTracker::ready();
    let detector = Arc::new(ScriptedDetector {
        delay: Duration::from_millis(5),
        ..ScriptedDetector::never()
    });

    let task = spawn_scan(
        CaptureSession::new(&Capabilities::available()),
        Arc::new(FakeCamera {
            tracker: tracker.clone(),
            failure: None,
        }),
        detector.clone(),
        VideoConstraints::default(),
        fast_schedule(None),
        &CancellationToken::new(),
    );
    tokio::time::sleep(Duration::from_millis(25)).await;
    task.cancel();
    let calls_at_cancel = detector.calls();
    let (_, outcome) = task.join().await.unwrap();

    assert_eq!(outcome, ScanOutcome::Cancelled);
    assert!(detector.calls() <= calls_at_cancel);
    assert_eq!(tracker.releases(), 1);
}
