//! Face geometry validation: count, size, centering, roll, yaw, containment.
//!
//! A pure function of the detector output and the frame size. Checks run in a
//! fixed order and the first failing check is the only one reported.

use crate::detector::FaceDetector;
use crate::thresholds::FaceThresholds;
use crate::types::{BoundingBox, Detection, FrameBuffer, LandmarkGroup, Landmarks, Point};
use serde::Serialize;

// Landmark indices inside each group, in 68-point model order.
const EYE_OUTER: usize = 0;
const EYE_INNER_FAR: usize = 3;
const NOSE_TIP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaceStatus {
    Loading,
    DetectorError,
    NoFace,
    MultipleFaces,
    TooFar,
    TooClose,
    OffCenterLeft,
    OffCenterRight,
    OffCenterUp,
    OffCenterDown,
    LandmarksMissing,
    Tilted,
    Turned,
    Partial,
    Ok,
}

impl FaceStatus {
    pub fn is_valid(self) -> bool {
        self == Self::Ok
    }

    /// Statuses that make the aggregated decision critical rather than a warning.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Self::DetectorError | Self::NoFace | Self::MultipleFaces | Self::TooFar | Self::TooClose
        )
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Loading => "Loading models...",
            Self::DetectorError => "Face detection failed.",
            Self::NoFace => "No face detected. Position face in oval.",
            Self::MultipleFaces => "Multiple faces detected. One person only.",
            Self::TooFar => "Too far away. Move closer.",
            Self::TooClose => "Too close. Move back.",
            Self::OffCenterLeft => "Move LEFT",
            Self::OffCenterRight => "Move RIGHT",
            Self::OffCenterUp => "Move DOWN",
            Self::OffCenterDown => "Move UP",
            Self::LandmarksMissing => "Face features not visible. Face the camera.",
            Self::Tilted => "Face tilted. Straighten head.",
            Self::Turned => "Look straight ahead.",
            Self::Partial => "Face partially out of frame.",
            Self::Ok => "Perfect! Hold still.",
        }
    }

    /// Directional hint for the user, as shown in the mirrored preview.
    pub fn correction(self) -> Option<Correction> {
        match self {
            Self::TooFar => Some(Correction::MoveCloser),
            Self::TooClose => Some(Correction::MoveBack),
            Self::OffCenterLeft => Some(Correction::Left),
            Self::OffCenterRight => Some(Correction::Right),
            Self::OffCenterUp => Some(Correction::Down),
            Self::OffCenterDown => Some(Correction::Up),
            Self::Tilted => Some(Correction::Rotate),
            Self::Turned => Some(Correction::Turn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Correction {
    MoveCloser,
    MoveBack,
    Left,
    Right,
    Up,
    Down,
    Rotate,
    Turn,
}

/// Geometry measured so far for a single face. Later fields stay `None`
/// when an earlier check already failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FaceMetrics {
    pub width_ratio: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub roll_degrees: Option<f32>,
    pub yaw_offset: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceResult {
    pub status: FaceStatus,
    pub message: &'static str,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FaceMetrics>,
    /// Present only when the face passed every check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Landmarks>,
}

impl FaceResult {
    pub fn with_status(status: FaceStatus) -> Self {
        Self {
            status,
            message: status.message(),
            is_valid: status.is_valid(),
            correction: status.correction(),
            metrics: None,
            bounding_box: None,
            landmarks: None,
        }
    }

    /// Result for a frame processed before the detector finished initializing.
    pub fn loading() -> Self {
        Self::with_status(FaceStatus::Loading)
    }

    /// Result for a frame whose detector call failed.
    pub fn detector_error() -> Self {
        Self::with_status(FaceStatus::DetectorError)
    }

    fn failed(status: FaceStatus, metrics: FaceMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::with_status(status)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FaceGeometryValidator {
    thresholds: FaceThresholds,
}

impl FaceGeometryValidator {
    pub fn new(thresholds: FaceThresholds) -> Self {
        Self { thresholds }
    }

    /// Run `detector` on `frame` and validate the result against the frame's
    /// own dimensions. Never fails: an unready detector reports LOADING and a
    /// failed call reports DETECTOR_ERROR.
    pub async fn evaluate<D: FaceDetector>(&self, detector: &mut D, frame: &FrameBuffer) -> FaceResult {
        if !detector.is_ready() {
            return FaceResult::loading();
        }
        match detector.detect(frame).await {
            Ok(detections) => self.validate(&detections, frame.width(), frame.height()),
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed");
                FaceResult::detector_error()
            }
        }
    }

    /// Validate the detections for one `frame_width` x `frame_height` frame.
    pub fn validate(&self, detections: &[Detection], frame_width: u32, frame_height: u32) -> FaceResult {
        // Nothing can be measured against an empty frame.
        if frame_width == 0 || frame_height == 0 {
            return FaceResult::with_status(FaceStatus::NoFace);
        }
        let detection = match detections {
            [] => return FaceResult::with_status(FaceStatus::NoFace),
            [single] => single,
            _ => return FaceResult::with_status(FaceStatus::MultipleFaces),
        };

        let t = &self.thresholds;
        let frame_w = frame_width as f32;
        let frame_h = frame_height as f32;
        let face = detection.bounding_box;

        let width_ratio = face.width / frame_w;
        let center = face.center();
        let mut metrics = FaceMetrics {
            width_ratio,
            offset_x: (center.x - frame_w / 2.0) / frame_w,
            offset_y: (center.y - frame_h / 2.0) / frame_h,
            ..FaceMetrics::default()
        };

        if width_ratio < t.min_width_ratio {
            return FaceResult::failed(FaceStatus::TooFar, metrics);
        }
        if width_ratio > t.max_width_ratio {
            return FaceResult::failed(FaceStatus::TooClose, metrics);
        }

        if let Some(status) = centering(metrics.offset_x, metrics.offset_y, t.max_center_offset) {
            return FaceResult::failed(status, metrics);
        }

        let Some(key) = KeyPoints::from_landmarks(&detection.landmarks) else {
            return FaceResult::failed(FaceStatus::LandmarksMissing, metrics);
        };

        let roll = roll_degrees(key.left_eye_outer, key.right_eye_outer);
        metrics.roll_degrees = Some(roll);
        if roll.abs() > t.max_tilt_degrees {
            return FaceResult::failed(FaceStatus::Tilted, metrics);
        }

        let yaw = yaw_offset(&key, face.width);
        metrics.yaw_offset = Some(yaw);
        if yaw.abs() > t.max_yaw_offset {
            return FaceResult::failed(FaceStatus::Turned, metrics);
        }

        if face.x < 0.0 || face.y < 0.0 || face.right() > frame_w || face.bottom() > frame_h {
            return FaceResult::failed(FaceStatus::Partial, metrics);
        }

        FaceResult {
            metrics: Some(metrics),
            bounding_box: Some(face),
            landmarks: Some(detection.landmarks.clone()),
            ..FaceResult::with_status(FaceStatus::Ok)
        }
    }
}

/// The landmark points the orientation checks read.
struct KeyPoints {
    left_eye_outer: Point,
    right_eye_outer: Point,
    right_eye_far: Point,
    nose_tip: Point,
}

impl KeyPoints {
    fn from_landmarks(landmarks: &Landmarks) -> Option<Self> {
        Some(Self {
            left_eye_outer: landmarks.point(LandmarkGroup::LeftEye, EYE_OUTER)?,
            right_eye_outer: landmarks.point(LandmarkGroup::RightEye, EYE_OUTER)?,
            right_eye_far: landmarks.point(LandmarkGroup::RightEye, EYE_INNER_FAR)?,
            nose_tip: landmarks.point(LandmarkGroup::Nose, NOSE_TIP)?,
        })
    }
}

/// First violated direction in the fixed order left, right, up, down.
fn centering(offset_x: f32, offset_y: f32, tolerance: f32) -> Option<FaceStatus> {
    if offset_x < -tolerance {
        Some(FaceStatus::OffCenterLeft)
    } else if offset_x > tolerance {
        Some(FaceStatus::OffCenterRight)
    } else if offset_y < -tolerance {
        Some(FaceStatus::OffCenterUp)
    } else if offset_y > tolerance {
        Some(FaceStatus::OffCenterDown)
    } else {
        None
    }
}

/// Angle of the eye line in degrees. A purely vertical eye line is ±90°.
fn roll_degrees(left_eye: Point, right_eye: Point) -> f32 {
    (right_eye.y - left_eye.y)
        .atan2(right_eye.x - left_eye.x)
        .to_degrees()
}

/// Nose-tip offset from the eye midpoint, normalized by face width.
fn yaw_offset(key: &KeyPoints, face_width: f32) -> f32 {
    let eye_mid_x = (key.left_eye_outer.x + key.right_eye_far.x) / 2.0;
    (key.nose_tip.x - eye_mid_x) / face_width
}
