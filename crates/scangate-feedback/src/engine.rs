//! The scan loop: capture, assess, emit, repeat.

use crate::config::Config;
use crate::overlay::OverlayState;
use crate::panel::{BrightnessMeter, CaptureAction, Checklist};
use crate::sink::FeedbackSink;
use scangate_core::{Decision, DetectorError, FaceDetector, QualityGate};
use scangate_hw::{FrameSource, SourceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
    #[error("scan loop already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Initializing,
    Running,
    Stopped,
}

/// Clone-safe stop handle shared between the loop and whoever cancels it.
#[derive(Clone, Default)]
pub struct LoopControl {
    inner: Arc<ControlInner>,
}

#[derive(Default)]
struct ControlInner {
    running: AtomicBool,
    notify: Notify,
}

impl LoopControl {
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Request a stop. The current cycle finishes without emitting and no
    /// further cycle starts. Safe to call any number of times.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    fn set_running(&self) {
        self.inner.running.store(true, Ordering::Release);
    }

    /// Resolves once `running` is false.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Drives one scanning session over an exclusively owned frame source.
///
/// Cycles never overlap: the next one starts only after the current one
/// has emitted its feedback.
pub struct FeedbackLoop<D, S, K> {
    detector: D,
    source: S,
    sink: K,
    gate: QualityGate,
    overlay: OverlayState,
    frame_interval: Duration,
    state: LoopState,
    control: LoopControl,
    last_decision: Option<Decision>,
    failed: bool,
    cycles: u64,
}

impl<D, S, K> FeedbackLoop<D, S, K>
where
    D: FaceDetector,
    S: FrameSource,
    K: FeedbackSink,
{
    pub fn new(config: &Config, detector: D, source: S, sink: K) -> Self {
        Self {
            detector,
            source,
            sink,
            gate: QualityGate::new(&config.thresholds),
            overlay: OverlayState::new(config.analysis_width, config.analysis_height),
            frame_interval: config.frame_interval(),
            state: LoopState::Idle,
            control: LoopControl::default(),
            last_decision: None,
            failed: false,
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn control(&self) -> LoopControl {
        self.control.clone()
    }

    /// The most recently emitted decision.
    pub fn last_decision(&self) -> Option<&Decision> {
        self.last_decision.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether capture may be triggered now. Stays blocked after a fatal
    /// session error until the next successful `start`.
    pub fn capture_action(&self) -> CaptureAction {
        if self.failed {
            return CaptureAction::Blocked;
        }
        self.last_decision
            .as_ref()
            .map_or(CaptureAction::Blocked, |d| CaptureAction::for_severity(d.severity))
    }

    /// Stop the loop and hand back the sink.
    pub fn into_sink(mut self) -> K {
        self.stop();
        self.sink
    }

    /// Acquire the frame source and wait for the detector. Either failure
    /// ends the session and is reported once to the sink.
    pub async fn start(&mut self) -> Result<(), LoopError> {
        if matches!(self.state, LoopState::Initializing | LoopState::Running) {
            return Err(LoopError::AlreadyRunning);
        }
        self.state = LoopState::Initializing;
        tracing::info!("scan loop initializing");

        if let Err(e) = self.source.open() {
            return Err(self.fail(e.into()));
        }

        if !self.detector.is_ready() {
            if let Err(e) = self.detector.initialize().await {
                return Err(self.fail(e.into()));
            }
            tracing::info!("face detector initialized");
        }

        self.last_decision = None;
        self.failed = false;
        self.control.set_running();
        self.state = LoopState::Running;
        tracing::info!(interval_ms = self.frame_interval.as_millis() as u64, "scan loop running");
        Ok(())
    }

    fn fail(&mut self, err: LoopError) -> LoopError {
        tracing::error!(error = %err, "scan session failed");
        self.sink.session_failed(&err.to_string());
        self.failed = true;
        self.source.release();
        self.control.stop();
        self.state = LoopState::Stopped;
        err
    }

    /// Run one capture-assess-emit cycle. Returns `None` when the loop is not
    /// running, the frame could not be captured, or a stop arrived while the
    /// detector was busy. Losing the source ends the session.
    pub async fn run_cycle(&mut self) -> Option<Decision> {
        if !self.control.is_running() {
            return None;
        }

        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(e) if e.is_unavailable() => {
                self.fail(e.into());
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed; skipping cycle");
                return None;
            }
        };

        let decision = self
            .gate
            .assess(&mut self.detector, &frame.buffer, Some(frame.original_size()))
            .await;

        if !self.control.is_running() {
            tracing::debug!(sequence = frame.sequence, "stopped during cycle; discarding decision");
            return None;
        }

        let checklist = Checklist::from_decision(&decision);
        let meter = BrightnessMeter::from_lighting(&decision.lighting);
        let overlay = self.overlay.update(&decision);

        self.sink.update_panel(&checklist, &meter);
        self.sink.update_overlay(&overlay);
        self.sink.render_decision(&decision);

        tracing::debug!(
            sequence = frame.sequence,
            severity = ?decision.severity,
            face = ?decision.face.status,
            lighting = ?decision.lighting.status,
            sharpness = ?decision.sharpness.status,
            mean = decision.lighting.mean_brightness(),
            score = decision.sharpness.score,
            latency_ms = frame.timestamp.elapsed().as_millis() as u64,
            "cycle complete"
        );

        self.cycles += 1;
        self.last_decision = Some(decision.clone());
        Some(decision)
    }

    /// Start if needed, then cycle every frame interval until stopped or
    /// `max_cycles` cycles have been attempted. Returns the number of
    /// cycles attempted.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<u64, LoopError> {
        if self.state != LoopState::Running {
            self.start().await?;
        }

        let control = self.control.clone();
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempted = 0u64;

        loop {
            tokio::select! {
                _ = control.stopped() => break,
                _ = ticker.tick() => {}
            }
            if !control.is_running() {
                break;
            }

            self.run_cycle().await;
            attempted += 1;
            if max_cycles.is_some_and(|max| attempted >= max) {
                break;
            }
        }

        self.stop();
        Ok(attempted)
    }

    /// Stop cycling and release the frame source. A no-op before `start`
    /// and after a previous `stop`.
    pub fn stop(&mut self) {
        self.control.stop();
        match self.state {
            LoopState::Running | LoopState::Initializing => {
                self.source.release();
                self.sink.reset();
                self.state = LoopState::Stopped;
                tracing::info!(cycles = self.cycles, "scan loop stopped");
            }
            LoopState::Idle | LoopState::Stopped => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::RecordingSink;
    use scangate_core::{
        BoundingBox, Detection, FaceStatus, FrameBuffer, FrameError, LandmarkGroup, Landmarks,
        Point, ReplayDetector, Severity,
    };
    use scangate_hw::Frame;
    use std::sync::Mutex;

    /// In-memory frame source with shared counters.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        level: u8,
        fail_open: bool,
        fail_capture: bool,
        lost_after: Option<usize>,
        open: Arc<AtomicBool>,
        releases: Arc<Mutex<usize>>,
        captures: Arc<Mutex<usize>>,
    }

    impl ScriptedSource {
        fn gray(level: u8) -> Self {
            Self {
                level,
                ..Self::default()
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<(), SourceError> {
            if self.fail_open {
                return Err(SourceError::NotFound("/dev/video9".into()));
            }
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn capture(&mut self) -> Result<Frame, SourceError> {
            if !self.is_open() {
                return Err(SourceError::NotOpen);
            }
            if self.fail_capture {
                return Err(SourceError::Frame(FrameError::EmptyDimensions { width: 0, height: 0 }));
            }
            let mut captures = self.captures.lock().unwrap();
            if self.lost_after.is_some_and(|n| *captures >= n) {
                return Err(SourceError::NotFound("/dev/video0".into()));
            }
            *captures += 1;
            let l = self.level;
            Ok(Frame {
                buffer: FrameBuffer::filled(160, 120, [l, l, l, 255]).unwrap(),
                original_width: 640,
                original_height: 480,
                timestamp: std::time::Instant::now(),
                sequence: *captures as u32,
            })
        }

        fn release(&mut self) {
            self.open.store(false, Ordering::SeqCst);
            *self.releases.lock().unwrap() += 1;
        }
    }

    fn centered_face() -> Detection {
        let b = BoundingBox::new(40.0, 20.0, 80.0, 90.0);
        let eye = |x: f32| (0..6).map(|i| Point::new(x + i as f32, 55.0)).collect();
        let nose = (0..9).map(|i| Point::new(80.0, 60.0 + i as f32)).collect();
        Detection::new(
            b,
            Landmarks::new()
                .with_group(LandmarkGroup::LeftEye, eye(62.0))
                .with_group(LandmarkGroup::RightEye, eye(95.0))
                .with_group(LandmarkGroup::Nose, nose),
        )
    }

    /// Requests a stop from inside `detect`, as a cancel arriving mid-cycle would.
    #[derive(Default)]
    struct StoppingDetector {
        control: Arc<Mutex<Option<LoopControl>>>,
    }

    impl FaceDetector for StoppingDetector {
        async fn initialize(&mut self) -> Result<(), DetectorError> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            true
        }

        async fn detect(&mut self, _frame: &FrameBuffer) -> Result<Vec<Detection>, DetectorError> {
            if let Some(control) = self.control.lock().unwrap().as_ref() {
                control.stop();
            }
            Ok(vec![centered_face()])
        }
    }

    fn config() -> Config {
        Config {
            frame_interval_ms: 10,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let source = ScriptedSource::gray(128);
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source.clone(), RecordingSink::default());
        scan.stop();
        scan.stop();
        assert!(!scan.is_running());
        assert_eq!(scan.state(), LoopState::Idle);
        assert_eq!(*source.releases.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_twice_after_start() {
        let source = ScriptedSource::gray(128);
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source.clone(), sink.clone());
        scan.start().await.unwrap();
        assert!(scan.is_running());
        assert!(source.is_open());

        scan.stop();
        scan.stop();
        assert!(!scan.is_running());
        assert_eq!(scan.state(), LoopState::Stopped);
        assert!(!source.is_open());
        assert_eq!(*source.releases.lock().unwrap(), 1);
        assert_eq!(*sink.resets.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut scan = FeedbackLoop::new(
            &config(),
            ReplayDetector::empty(),
            ScriptedSource::gray(128),
            RecordingSink::default(),
        );
        scan.start().await.unwrap();
        assert!(matches!(scan.start().await, Err(LoopError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_cycle_emits_to_sink() {
        let sink = RecordingSink::default();
        let detector = ReplayDetector::new(vec![vec![centered_face()]]);
        let mut scan = FeedbackLoop::new(&config(), detector, ScriptedSource::gray(128), sink.clone());
        scan.start().await.unwrap();

        let decision = scan.run_cycle().await.unwrap();
        assert_eq!(decision.face.status, FaceStatus::Ok, "{:?}", decision.face);
        assert_eq!(decision.severity, Severity::Ok);
        assert_eq!(sink.rendered(), vec![decision.message]);
        assert_eq!(*sink.panels.lock().unwrap(), 1);
        assert_eq!(*sink.overlays.lock().unwrap(), 1);
        assert_eq!(scan.cycles(), 1);
        assert!(scan.last_decision().is_some());
    }

    #[tokio::test]
    async fn test_cycle_without_start_does_nothing() {
        let source = ScriptedSource::gray(128);
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source.clone(), sink.clone());
        assert!(scan.run_cycle().await.is_none());
        assert_eq!(*source.captures.lock().unwrap(), 0);
        assert!(sink.rendered().is_empty());
    }

    #[tokio::test]
    async fn test_detector_init_failure_is_fatal() {
        let source = ScriptedSource::gray(128);
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::new(vec![]), source.clone(), sink.clone());

        let err = scan.start().await.unwrap_err();
        assert!(matches!(err, LoopError::Detector(DetectorError::InitFailed(_))));
        assert_eq!(scan.state(), LoopState::Stopped);
        assert!(!source.is_open());
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert!(sink.rendered().is_empty());
        assert_eq!(scan.capture_action(), CaptureAction::Blocked);
    }

    #[tokio::test]
    async fn test_source_open_failure_is_fatal() {
        let source = ScriptedSource {
            fail_open: true,
            ..ScriptedSource::gray(128)
        };
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source, sink.clone());
        assert!(matches!(scan.start().await, Err(LoopError::Source(_))));
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert!(!scan.is_running());
    }

    #[tokio::test]
    async fn test_capture_failure_skips_cycle_but_keeps_running() {
        let source = ScriptedSource {
            fail_capture: true,
            ..ScriptedSource::gray(128)
        };
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source, sink.clone());
        scan.start().await.unwrap();
        assert!(scan.run_cycle().await.is_none());
        assert!(scan.is_running());
        assert!(sink.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_source_is_fatal() {
        let source = ScriptedSource {
            lost_after: Some(1),
            ..ScriptedSource::gray(128)
        };
        let sink = RecordingSink::default();
        let detector = ReplayDetector::new(vec![vec![centered_face()]]);
        let mut scan = FeedbackLoop::new(&config(), detector, source.clone(), sink.clone());
        scan.start().await.unwrap();

        assert!(scan.run_cycle().await.is_some());
        assert_eq!(scan.capture_action(), CaptureAction::Ready);

        assert!(scan.run_cycle().await.is_none());
        assert_eq!(scan.state(), LoopState::Stopped);
        assert!(!scan.is_running());
        assert!(!source.is_open());
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert_eq!(scan.capture_action(), CaptureAction::Blocked);

        // Already stopped: no second report.
        assert!(scan.run_cycle().await.is_none());
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert_eq!(sink.rendered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ends_when_source_lost() {
        let source = ScriptedSource {
            lost_after: Some(2),
            ..ScriptedSource::gray(128)
        };
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source, sink.clone());
        let attempted = scan.run(None).await.unwrap();
        assert_eq!(attempted, 3);
        assert_eq!(sink.rendered().len(), 2);
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
        assert_eq!(scan.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_during_detection_discards_decision() {
        let detector = StoppingDetector::default();
        let slot = detector.control.clone();
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), detector, ScriptedSource::gray(128), sink.clone());
        *slot.lock().unwrap() = Some(scan.control());
        scan.start().await.unwrap();

        assert!(scan.run_cycle().await.is_none());
        assert!(sink.rendered().is_empty());
        assert_eq!(*sink.panels.lock().unwrap(), 0);
        assert_eq!(*sink.overlays.lock().unwrap(), 0);
        assert_eq!(scan.cycles(), 0);
        assert!(scan.last_decision().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_max_cycles() {
        let source = ScriptedSource::gray(128);
        let sink = RecordingSink::default();
        let mut scan = FeedbackLoop::new(&config(), ReplayDetector::empty(), source.clone(), sink.clone());

        let attempted = scan.run(Some(3)).await.unwrap();
        assert_eq!(attempted, 3);
        assert_eq!(*source.captures.lock().unwrap(), 3);
        assert_eq!(sink.rendered().len(), 3);
        assert_eq!(scan.state(), LoopState::Stopped);
        assert!(!source.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_stop_ends_run() {
        let source = ScriptedSource::gray(40);
        let mut scan = FeedbackLoop::new(
            &config(),
            ReplayDetector::empty(),
            source.clone(),
            RecordingSink::default(),
        );
        scan.start().await.unwrap();
        let control = scan.control();

        let handle = tokio::spawn(async move {
            let attempted = scan.run(None).await.unwrap();
            (attempted, scan)
        });
        tokio::time::sleep(Duration::from_millis(55)).await;
        control.stop();
        control.stop();

        let (attempted, scan) = handle.await.unwrap();
        assert!(attempted >= 1);
        assert!(!scan.is_running());
        assert_eq!(scan.state(), LoopState::Stopped);
        assert_eq!(*source.releases.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let source = ScriptedSource::gray(128);
        let mut scan = FeedbackLoop::new(
            &config(),
            ReplayDetector::empty(),
            source.clone(),
            RecordingSink::default(),
        );
        scan.start().await.unwrap();
        scan.stop();
        scan.start().await.unwrap();
        assert!(scan.is_running());
        assert!(source.is_open());
    }
}
