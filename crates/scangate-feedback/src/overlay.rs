//! Guide overlay state. Produces what to draw each frame; drawing itself
//! belongs to the host UI.

use scangate_core::{Decision, FaceStatus, Gate, LandmarkGroup, LightingStatus, Point};
use serde::Serialize;

const OVAL_WIDTH_RATIO: f32 = 0.6;
const OVAL_HEIGHT_RATIO: f32 = 0.75;
const SCAN_LINE_STEP: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Ok,
    Warning,
    Critical,
}

impl Tone {
    /// Overlay colour class. Stricter than the decision severity: only
    /// clipped lighting and a missing face are shown as critical.
    pub fn for_decision(decision: &Decision) -> Self {
        match decision.gate {
            Gate::None => Self::Ok,
            Gate::Face if decision.face.status == FaceStatus::NoFace => Self::Critical,
            Gate::Lighting
                if matches!(
                    decision.lighting.status,
                    LightingStatus::TooBright | LightingStatus::TooDark
                ) =>
            {
                Self::Critical
            }
            _ => Self::Warning,
        }
    }
}

/// Centered guide ellipse, as a bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Oval {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Oval {
    pub fn centered(frame_width: u32, frame_height: u32) -> Self {
        let width = frame_width as f32 * OVAL_WIDTH_RATIO;
        let height = frame_height as f32 * OVAL_HEIGHT_RATIO;
        Self {
            x: (frame_width as f32 - width) / 2.0,
            y: (frame_height as f32 - height) / 2.0,
            width,
            height,
        }
    }
}

/// Everything the host needs to draw one overlay frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayFrame {
    pub oval: Oval,
    pub tone: Tone,
    pub pulse: bool,
    /// Absolute y of the scan line; only drawn while the decision is OK.
    pub scan_line_y: Option<f32>,
    /// Eye and nose points of an accepted face.
    pub highlights: Vec<Point>,
}

/// Per-session overlay animation state.
#[derive(Debug, Clone)]
pub struct OverlayState {
    oval: Oval,
    scan_offset: f32,
    scan_direction: f32,
}

impl OverlayState {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            oval: Oval::centered(frame_width, frame_height),
            scan_offset: 0.0,
            scan_direction: 1.0,
        }
    }

    /// Advance one frame. The scan line only moves while the decision is OK.
    pub fn update(&mut self, decision: &Decision) -> OverlayFrame {
        let tone = Tone::for_decision(decision);
        let scan_line_y = (tone == Tone::Ok).then(|| self.advance_scan_line());

        let highlights = decision
            .face
            .landmarks
            .as_ref()
            .map(|lm| {
                [LandmarkGroup::LeftEye, LandmarkGroup::RightEye, LandmarkGroup::Nose]
                    .into_iter()
                    .flat_map(|group| lm.group(group).iter().copied())
                    .collect()
            })
            .unwrap_or_default();

        OverlayFrame {
            oval: self.oval,
            tone,
            pulse: tone != Tone::Ok,
            scan_line_y,
            highlights,
        }
    }

    /// Bounce between the top and bottom of the oval.
    fn advance_scan_line(&mut self) -> f32 {
        self.scan_offset += SCAN_LINE_STEP * self.scan_direction;
        if self.scan_offset > self.oval.height {
            self.scan_direction = -1.0;
        }
        if self.scan_offset < 0.0 {
            self.scan_direction = 1.0;
        }
        self.oval.y + self.scan_offset
    }
}
