//! Feedback sinks and the decision debouncer.

use crate::overlay::OverlayFrame;
use crate::panel::{BrightnessMeter, Checklist};
use scangate_core::Decision;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Receiver of per-cycle feedback. Injected into the loop at construction.
///
/// Only `render_decision` is required; the panel and overlay hooks default
/// to no-ops for sinks that show a banner alone.
pub trait FeedbackSink: Send {
    /// Show a decision (banner text plus capture action state).
    fn render_decision(&mut self, decision: &Decision);

    fn update_panel(&mut self, _checklist: &Checklist, _meter: &BrightnessMeter) {}

    fn update_overlay(&mut self, _overlay: &OverlayFrame) {}

    /// A collaborator failed for good; the capture action must stay disabled.
    fn session_failed(&mut self, _message: &str) {}

    /// The loop stopped. Anything not yet shown is stale.
    fn reset(&mut self) {}
}

enum Update {
    Decision(Box<Decision>),
    Panel(Checklist, BrightnessMeter),
    Overlay(Box<OverlayFrame>),
    Failed(String),
    Reset,
}

/// Wraps a sink so that decisions are rendered only after `window` passes
/// without a different decision arriving.
///
/// A new decision with a different outcome cancels the pending one and
/// restarts the window. A decision with the same outcome as the pending one
/// is dropped and leaves the timer alone. A decision identical to what is
/// already on screen is never re-rendered. Panel and overlay updates pass
/// straight through.
///
/// The timer lives in a task that owns the inner sink; it must be created
/// inside a tokio runtime.
pub struct DebouncedSink {
    tx: mpsc::UnboundedSender<Update>,
    task: JoinHandle<()>,
}

impl DebouncedSink {
    pub fn spawn<K: FeedbackSink + 'static>(inner: K, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_debouncer(inner, window, rx));
        Self { tx, task }
    }

    fn send(&self, update: Update) {
        if self.tx.send(update).is_err() {
            tracing::warn!("feedback sink task has exited; dropping update");
        }
    }

    /// Close the channel and wait for the task. A pending decision is dropped.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "feedback sink task failed");
        }
    }
}

impl FeedbackSink for DebouncedSink {
    fn render_decision(&mut self, decision: &Decision) {
        self.send(Update::Decision(Box::new(decision.clone())));
    }

    fn update_panel(&mut self, checklist: &Checklist, meter: &BrightnessMeter) {
        self.send(Update::Panel(checklist.clone(), *meter));
    }

    fn update_overlay(&mut self, overlay: &OverlayFrame) {
        self.send(Update::Overlay(Box::new(overlay.clone())));
    }

    fn session_failed(&mut self, message: &str) {
        self.send(Update::Failed(message.to_string()));
    }

    fn reset(&mut self) {
        self.send(Update::Reset);
    }
}

async fn run_debouncer<K: FeedbackSink>(
    mut inner: K,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Update>,
) {
    let mut pending: Option<(Box<Decision>, Instant)> = None;
    let mut shown: Option<Box<Decision>> = None;

    loop {
        let deadline = pending.as_ref().map(|(_, at)| *at);
        tokio::select! {
            update = rx.recv() => match update {
                Some(Update::Decision(decision)) => {
                    let same_as_pending = pending
                        .as_ref()
                        .is_some_and(|(p, _)| p.same_outcome(&decision));
                    if !same_as_pending {
                        pending = Some((decision, Instant::now() + window));
                    }
                }
                Some(Update::Panel(checklist, meter)) => inner.update_panel(&checklist, &meter),
                Some(Update::Overlay(overlay)) => inner.update_overlay(&overlay),
                Some(Update::Failed(message)) => {
                    pending = None;
                    inner.session_failed(&message);
                }
                Some(Update::Reset) => {
                    pending = None;
                    shown = None;
                    inner.reset();
                }
                None => break,
            },
            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                if let Some((decision, _)) = pending.take() {
                    let unchanged = shown.as_ref().is_some_and(|s| s.same_outcome(&decision));
                    if !unchanged {
                        tracing::debug!(
                            severity = ?decision.severity,
                            text = decision.message,
                            "rendering decision"
                        );
                        inner.render_decision(&decision);
                        shown = Some(decision);
                    }
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(at) = deadline {
        tokio::time::sleep_until(at).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use scangate_core::{
        FaceResult, FaceStatus, FrameBuffer, LightingAnalyzer, QualityAggregator, SharpnessResult,
        SharpnessStatus,
    };
    use std::sync::{Arc, Mutex};

    /// Records everything it is asked to show.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub decisions: Arc<Mutex<Vec<&'static str>>>,
        pub panels: Arc<Mutex<usize>>,
        pub overlays: Arc<Mutex<usize>>,
        pub failures: Arc<Mutex<Vec<String>>>,
        pub resets: Arc<Mutex<usize>>,
    }

    impl RecordingSink {
        pub fn rendered(&self) -> Vec<&'static str> {
            self.decisions.lock().unwrap().clone()
        }
    }

    impl FeedbackSink for RecordingSink {
        fn render_decision(&mut self, decision: &Decision) {
            self.decisions.lock().unwrap().push(decision.message);
        }

        fn update_panel(&mut self, _checklist: &Checklist, _meter: &BrightnessMeter) {
            *self.panels.lock().unwrap() += 1;
        }

        fn update_overlay(&mut self, _overlay: &OverlayFrame) {
            *self.overlays.lock().unwrap() += 1;
        }

        fn session_failed(&mut self, message: &str) {
            self.failures.lock().unwrap().push(message.to_string());
        }

        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }
    }

    pub(crate) fn decision(face: FaceStatus) -> Decision {
        let frame = FrameBuffer::filled(16, 16, [128, 128, 128, 255]).unwrap();
        QualityAggregator.aggregate(
            FaceResult::with_status(face),
            LightingAnalyzer::default().analyze(&frame),
            SharpnessResult {
                status: SharpnessStatus::Sharp,
                message: SharpnessStatus::Sharp.message(),
                is_valid: true,
                score: 400.0,
            },
        )
    }

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_decision_renders_after_window() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);

        sink.render_decision(&decision(FaceStatus::NoFace));
        tokio::time::sleep(ms(99)).await;
        assert!(rec.rendered().is_empty());

        tokio::time::sleep(ms(2)).await;
        assert_eq!(rec.rendered(), vec![FaceStatus::NoFace.message()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_decisions_in_window_collapse_to_latest() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);

        sink.render_decision(&decision(FaceStatus::NoFace));
        tokio::time::sleep(ms(50)).await;
        sink.render_decision(&decision(FaceStatus::TooFar));

        // The first decision's deadline has passed; it was replaced.
        tokio::time::sleep(ms(60)).await;
        assert!(rec.rendered().is_empty());

        tokio::time::sleep(ms(50)).await;
        assert_eq!(rec.rendered(), vec![FaceStatus::TooFar.message()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_decision_does_not_restart_timer() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);

        sink.render_decision(&decision(FaceStatus::Tilted));
        tokio::time::sleep(ms(60)).await;
        sink.render_decision(&decision(FaceStatus::Tilted));
        tokio::time::sleep(ms(45)).await;
        assert_eq!(rec.rendered(), vec![FaceStatus::Tilted.message()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_decision_not_rerendered() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);

        for _ in 0..10 {
            sink.render_decision(&decision(FaceStatus::Ok));
            tokio::time::sleep(ms(33)).await;
        }
        tokio::time::sleep(ms(200)).await;
        assert_eq!(rec.rendered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panel_updates_pass_through() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);
        let d = decision(FaceStatus::Ok);
        sink.update_panel(
            &Checklist::from_decision(&d),
            &BrightnessMeter::from_lighting(&d.lighting),
        );
        tokio::time::sleep(ms(1)).await;
        assert_eq!(*rec.panels.lock().unwrap(), 1);
        assert!(rec.rendered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_decision() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);

        sink.render_decision(&decision(FaceStatus::NoFace));
        tokio::time::sleep(ms(20)).await;
        sink.reset();
        tokio::time::sleep(ms(200)).await;
        assert!(rec.rendered().is_empty());
        assert_eq!(*rec.resets.lock().unwrap(), 1);

        sink.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_immediate_and_drops_pending() {
        let rec = RecordingSink::default();
        let mut sink = DebouncedSink::spawn(rec.clone(), WINDOW);

        sink.render_decision(&decision(FaceStatus::NoFace));
        sink.session_failed("camera unplugged");
        tokio::time::sleep(ms(1)).await;
        assert_eq!(*rec.failures.lock().unwrap(), vec!["camera unplugged".to_string()]);

        tokio::time::sleep(ms(200)).await;
        assert!(rec.rendered().is_empty());
    }
}
