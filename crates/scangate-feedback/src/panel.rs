//! Status panel model: checklist rows, brightness meter and the capture action state.

use scangate_core::{Decision, FaceResult, FaceStatus, LightingResult, LightingStatus, Severity, SharpnessResult};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistItem {
    pub label: &'static str,
    pub passed: bool,
    /// "OK" when passed, otherwise a short reason.
    pub detail: &'static str,
}

impl ChecklistItem {
    fn new(label: &'static str, passed: bool, reason: &'static str) -> Self {
        Self {
            label,
            passed,
            detail: if passed { "OK" } else { reason },
        }
    }
}

/// Four pass/fail rows derived from one cycle's results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checklist {
    pub face: ChecklistItem,
    pub position: ChecklistItem,
    pub lighting: ChecklistItem,
    pub clarity: ChecklistItem,
}

impl Checklist {
    pub fn from_results(face: &FaceResult, lighting: &LightingResult, sharpness: &SharpnessResult) -> Self {
        Self {
            face: ChecklistItem::new("Face detected", face.status != FaceStatus::NoFace, face.message),
            // A partially visible face is still considered positioned.
            position: ChecklistItem::new(
                "Position",
                matches!(face.status, FaceStatus::Ok | FaceStatus::Partial),
                "Adjust",
            ),
            lighting: ChecklistItem::new("Lighting", lighting.is_valid, lighting.message),
            clarity: ChecklistItem::new("Clarity", sharpness.is_valid, sharpness.message),
        }
    }

    pub fn from_decision(decision: &Decision) -> Self {
        Self::from_results(&decision.face, &decision.lighting, &decision.sharpness)
    }

    pub fn items(&self) -> [&ChecklistItem; 4] {
        [&self.face, &self.position, &self.lighting, &self.clarity]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterLevel {
    Ok,
    Warning,
    Error,
}

/// Mean brightness normalized to a 0–100 meter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BrightnessMeter {
    pub percent: f64,
    pub level: MeterLevel,
}

impl BrightnessMeter {
    pub fn from_lighting(lighting: &LightingResult) -> Self {
        let percent = (lighting.mean_brightness() / 255.0 * 100.0).min(100.0);
        let level = match lighting.status {
            LightingStatus::TooBright | LightingStatus::TooDark => MeterLevel::Error,
            LightingStatus::Bright | LightingStatus::Dim => MeterLevel::Warning,
            _ => MeterLevel::Ok,
        };
        Self { percent, level }
    }
}

/// Whether the downstream capture action may be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureAction {
    Blocked,
    AllowedWithWarning,
    Ready,
}

impl CaptureAction {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Self::Blocked,
            Severity::Warning => Self::AllowedWithWarning,
            Severity::Ok => Self::Ready,
        }
    }
}
