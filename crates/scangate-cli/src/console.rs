//! Terminal rendering of decisions and the status panel.

use scangate_core::Decision;
use scangate_feedback::{BrightnessMeter, CaptureAction, Checklist, FeedbackSink};

pub fn severity_label(decision: &Decision) -> String {
    format!("{:?}", decision.severity).to_uppercase()
}

pub fn capture_label(action: CaptureAction) -> &'static str {
    match action {
        CaptureAction::Blocked => "capture blocked",
        CaptureAction::AllowedWithWarning => "capture allowed (warning)",
        CaptureAction::Ready => "capture ready",
    }
}

pub fn checklist_line(checklist: &Checklist) -> String {
    checklist
        .items()
        .iter()
        .map(|item| {
            let mark = if item.passed { "ok" } else { "x " };
            format!("[{mark}] {}: {}", item.label, item.detail)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn meter_bar(meter: &BrightnessMeter) -> String {
    const WIDTH: usize = 20;
    let filled = ((meter.percent / 100.0) * WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}% ({:?})",
        "#".repeat(filled.min(WIDTH)),
        "-".repeat(WIDTH - filled.min(WIDTH)),
        meter.percent,
        meter.level
    )
}

/// Prints each rendered decision with the latest panel state.
#[derive(Default)]
pub struct ConsoleSink {
    panel: Option<(Checklist, BrightnessMeter)>,
}

impl FeedbackSink for ConsoleSink {
    fn render_decision(&mut self, decision: &Decision) {
        let action = CaptureAction::for_severity(decision.severity);
        println!(
            "{:<8} {}  ({})",
            severity_label(decision),
            decision.message,
            capture_label(action)
        );
        if let Some((checklist, meter)) = &self.panel {
            println!("         {}", checklist_line(checklist));
            println!("         brightness {}", meter_bar(meter));
        }
    }

    fn update_panel(&mut self, checklist: &Checklist, meter: &BrightnessMeter) {
        self.panel = Some((checklist.clone(), *meter));
    }

    fn session_failed(&mut self, message: &str) {
        eprintln!("FATAL    {message}  ({})", capture_label(CaptureAction::Blocked));
    }

    fn reset(&mut self) {
        self.panel = None;
    }
}
