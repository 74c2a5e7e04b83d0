//! scangate-core: per-frame face capture quality gating.
//!
//! Three independent analyzers run on a small RGBA analysis buffer:
//! lighting (luma statistics), sharpness (neighbour-difference proxy) and
//! face geometry (detector output against size, centering, roll, yaw and
//! containment limits). The aggregator merges them into one decision.

pub mod aggregate;
pub mod detector;
pub mod face;
pub mod lighting;
pub mod sharpness;
pub mod thresholds;
pub mod types;

pub use aggregate::{Decision, Gate, QualityAggregator, QualityGate, Severity, READY_MESSAGE};
pub use detector::{DetectorError, FaceDetector, ReplayDetector};
pub use face::{Correction, FaceGeometryValidator, FaceResult, FaceStatus};
pub use lighting::{LightingAnalyzer, LightingResult, LightingStatus};
pub use sharpness::{SharpnessAnalyzer, SharpnessResult, SharpnessStatus};
pub use thresholds::GateThresholds;
pub use types::{BoundingBox, Detection, FrameBuffer, FrameError, LandmarkGroup, Landmarks, Point};
