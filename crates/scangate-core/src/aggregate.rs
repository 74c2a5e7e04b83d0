//! Merges the three per-frame results into one decision.

use crate::detector::FaceDetector;
use crate::face::{FaceGeometryValidator, FaceResult};
use crate::lighting::{LightingAnalyzer, LightingResult, LightingStatus};
use crate::sharpness::{SharpnessAnalyzer, SharpnessResult};
use crate::thresholds::GateThresholds;
use crate::types::FrameBuffer;
use serde::Serialize;

/// Message carried by a decision that passed every gate.
pub const READY_MESSAGE: &str = "Perfect! Face is ready.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

/// Which gate produced the decision's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Face,
    Lighting,
    Sharpness,
    None,
}

/// Aggregated outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub severity: Severity,
    pub message: &'static str,
    pub gate: Gate,
    pub face: FaceResult,
    pub lighting: LightingResult,
    pub sharpness: SharpnessResult,
}

impl Decision {
    /// Same severity and message. Sinks use this to skip re-rendering.
    pub fn same_outcome(&self, other: &Decision) -> bool {
        self.severity == other.severity && self.message == other.message
    }

    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }
}

/// Priority policy: face gate first, then lighting, then sharpness.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityAggregator;

impl QualityAggregator {
    pub fn aggregate(
        &self,
        face: FaceResult,
        lighting: LightingResult,
        sharpness: SharpnessResult,
    ) -> Decision {
        let (severity, message, gate) = if !face.is_valid {
            let severity = if face.status.is_critical() {
                Severity::Critical
            } else {
                Severity::Warning
            };
            (severity, face.message, Gate::Face)
        } else if !lighting.is_valid {
            let severity = match lighting.status {
                LightingStatus::TooBright | LightingStatus::TooDark => Severity::Critical,
                _ => Severity::Warning,
            };
            (severity, lighting.message, Gate::Lighting)
        } else if !sharpness.is_valid {
            (Severity::Warning, sharpness.message, Gate::Sharpness)
        } else {
            (Severity::Ok, READY_MESSAGE, Gate::None)
        };

        Decision {
            severity,
            message,
            gate,
            face,
            lighting,
            sharpness,
        }
    }
}

/// The full per-frame pipeline: three analyzers plus the aggregator.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    lighting: LightingAnalyzer,
    sharpness: SharpnessAnalyzer,
    face: FaceGeometryValidator,
    aggregator: QualityAggregator,
}

impl QualityGate {
    pub fn new(thresholds: &GateThresholds) -> Self {
        Self {
            lighting: LightingAnalyzer::new(thresholds.lighting.clone()),
            sharpness: SharpnessAnalyzer::new(thresholds.sharpness.clone()),
            face: FaceGeometryValidator::new(thresholds.face.clone()),
            aggregator: QualityAggregator,
        }
    }

    /// Assess one analysis buffer. `original_size` is the capture resolution
    /// before downscaling. Only the detector call suspends.
    pub async fn assess<D: FaceDetector>(
        &self,
        detector: &mut D,
        frame: &FrameBuffer,
        original_size: Option<(u32, u32)>,
    ) -> Decision {
        let lighting = self.lighting.analyze(frame);
        let sharpness = self.sharpness.analyze(frame, original_size);
        let face = self.face.evaluate(detector, frame).await;
        self.aggregator.aggregate(face, lighting, sharpness)
    }
}
