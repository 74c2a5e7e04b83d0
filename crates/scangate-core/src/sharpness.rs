//! Sharpness estimate via four-neighbour absolute differences.
//!
//! A cheap stand-in for Laplacian variance: only threshold behaviour matters,
//! not the absolute scale of the score.

use crate::thresholds::SharpnessThresholds;
use crate::types::{FrameBuffer, CHANNELS};
use serde::Serialize;

/// Sampling grid step in both axes.
const GRID_STEP: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SharpnessStatus {
    LowRes,
    Blurry,
    Sharp,
}

impl SharpnessStatus {
    /// Blur is advisory; only an undersized capture blocks.
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::LowRes)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::LowRes => "Image resolution too low.",
            Self::Blurry => "Image is blurry. Hold steady.",
            Self::Sharp => "Image is sharp.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharpnessResult {
    pub status: SharpnessStatus,
    pub message: &'static str,
    pub is_valid: bool,
    pub score: f64,
}

impl SharpnessResult {
    fn from_status(status: SharpnessStatus, score: f64) -> Self {
        Self {
            status,
            message: status.message(),
            is_valid: status.is_valid(),
            score,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharpnessAnalyzer {
    thresholds: SharpnessThresholds,
}

impl SharpnessAnalyzer {
    pub fn new(thresholds: SharpnessThresholds) -> Self {
        Self { thresholds }
    }

    /// Score `frame`. `original_size` is the capture resolution before
    /// downscaling; when unknown the buffer's own size is checked.
    pub fn analyze(&self, frame: &FrameBuffer, original_size: Option<(u32, u32)>) -> SharpnessResult {
        let (width, height) = original_size.unwrap_or((frame.width(), frame.height()));
        let floor = self.thresholds.min_resolution;
        if width < floor || height < floor {
            tracing::trace!(width, height, floor, "capture below resolution floor");
            return SharpnessResult::from_status(SharpnessStatus::LowRes, 0.0);
        }

        let score = edge_energy(frame) * self.thresholds.score_scale;
        let status = if score < self.thresholds.min_score {
            SharpnessStatus::Blurry
        } else {
            SharpnessStatus::Sharp
        };

        tracing::trace!(score, ?status, "sharpness analyzed");
        SharpnessResult::from_status(status, score)
    }
}

/// Mean summed absolute gray difference to the four neighbours, over a
/// 2-pixel grid that skips the outer border. Zero when the frame has no
/// interior pixels.
fn edge_energy(frame: &FrameBuffer) -> f64 {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    if w < 3 || h < 3 {
        return 0.0;
    }

    let data = frame.data();
    let gray = |x: usize, y: usize| -> f64 {
        let i = (y * w + x) * CHANNELS;
        (data[i] as f64 + data[i + 1] as f64 + data[i + 2] as f64) / 3.0
    };

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in (1..h - 1).step_by(GRID_STEP) {
        for x in (1..w - 1).step_by(GRID_STEP) {
            let center = gray(x, y);
            sum += (center - gray(x - 1, y)).abs()
                + (center - gray(x + 1, y)).abs()
                + (center - gray(x, y - 1)).abs()
                + (center - gray(x, y + 1)).abs();
            count += 1;
        }
    }

    sum / count as f64
}
