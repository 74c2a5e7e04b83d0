//! Lighting analysis: luma histogram, exposure clipping, left/right evenness.
//!
//! Samples every `sample_stride`-th pixel of the analysis buffer, computes
//! Rec. 601 luma and classifies the frame into one brightness band. A harsh
//! shadow check is layered on top of any non-blocking band.

use crate::thresholds::LightingThresholds;
use crate::types::{FrameBuffer, CHANNELS};
use serde::Serialize;

// Rec. 601 weights scaled by 1000 so that gray pixels map back to their exact value.
const LUMA_R: u32 = 299;
const LUMA_G: u32 = 587;
const LUMA_B: u32 = 114;
const LUMA_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightingStatus {
    TooBright,
    TooDark,
    Bright,
    Dim,
    Uneven,
    Shadows,
    Optimal,
}

impl LightingStatus {
    /// Only the clipped bands block the capture.
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::TooBright | Self::TooDark)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::TooBright => "Heavy lighting detected! Your face is overexposed.",
            Self::TooDark => "It's too dark! Your face is not clearly visible.",
            Self::Bright => "Lighting is a bit too bright.",
            Self::Dim => "Lighting is a bit dim.",
            Self::Uneven => "Uneven lighting detected.",
            Self::Shadows => "Harsh shadows detected.",
            Self::Optimal => "Lighting is perfect!",
        }
    }

    fn hint(self) -> Option<&'static str> {
        match self {
            Self::TooBright => Some("Move away from direct bright lights"),
            Self::TooDark => Some("Turn on more lights or move to a brighter area"),
            Self::Uneven => Some("Face the light source directly"),
            Self::Shadows => Some("Use softer lighting if possible"),
            Self::Bright | Self::Dim | Self::Optimal => None,
        }
    }
}

/// Raw luma statistics over the sampled pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightingStats {
    pub mean_brightness: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub std_dev: f64,
    pub overexposed_fraction: f64,
    pub underexposed_fraction: f64,
    /// Absolute difference between the left-half and right-half means.
    pub side_difference: f64,
    pub samples: usize,
}

impl LightingStats {
    pub fn measure(frame: &FrameBuffer, thresholds: &LightingThresholds) -> Self {
        let data = frame.data();
        let width = frame.width() as usize;
        let half_width = frame.width() as f64 / 2.0;

        let mut histogram = [0u32; 256];
        let mut sum = 0.0f64;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut overexposed = 0usize;
        let mut underexposed = 0usize;
        let (mut left_sum, mut left_count) = (0.0f64, 0usize);
        let (mut right_sum, mut right_count) = (0.0f64, 0usize);
        let mut samples = 0usize;

        for p in (0..frame.pixel_count()).step_by(thresholds.sample_stride.max(1)) {
            let i = p * CHANNELS;
            let value = luma(data[i], data[i + 1], data[i + 2]);

            sum += value;
            min = min.min(value);
            max = max.max(value);
            histogram[(value.floor() as usize).min(255)] += 1;

            if value > thresholds.overexposed_level {
                overexposed += 1;
            }
            if value < thresholds.underexposed_level {
                underexposed += 1;
            }

            if ((p % width) as f64) < half_width {
                left_sum += value;
                left_count += 1;
            } else {
                right_sum += value;
                right_count += 1;
            }
            samples += 1;
        }

        // FrameBuffer guarantees at least one pixel, and p = 0 is always sampled.
        debug_assert!(samples > 0, "lighting analysis needs at least one sample");
        let n = samples as f64;
        let mean = sum / n;

        let variance = histogram
            .iter()
            .enumerate()
            .map(|(bucket, &count)| count as f64 * (bucket as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        // A one-column frame has no right half; treat it as even.
        let side_difference = if left_count > 0 && right_count > 0 {
            (left_sum / left_count as f64 - right_sum / right_count as f64).abs()
        } else {
            0.0
        };

        Self {
            mean_brightness: mean,
            min_brightness: min,
            max_brightness: max,
            std_dev: variance.sqrt(),
            overexposed_fraction: overexposed as f64 / n,
            underexposed_fraction: underexposed as f64 / n,
            side_difference,
            samples,
        }
    }
}

/// Outcome of lighting analysis for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightingResult {
    pub status: LightingStatus,
    pub message: &'static str,
    pub is_valid: bool,
    /// Advisory hints, most specific first.
    pub details: Vec<&'static str>,
    #[serde(flatten)]
    pub stats: LightingStats,
}

impl LightingResult {
    pub fn mean_brightness(&self) -> f64 {
        self.stats.mean_brightness
    }

    pub fn std_dev(&self) -> f64 {
        self.stats.std_dev
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightingAnalyzer {
    thresholds: LightingThresholds,
}

impl LightingAnalyzer {
    pub fn new(thresholds: LightingThresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, frame: &FrameBuffer) -> LightingResult {
        let stats = LightingStats::measure(frame, &self.thresholds);
        let (band, status) = classify(&stats, &self.thresholds);

        let mut details: Vec<&'static str> = band.hint().into_iter().collect();
        if status != band {
            details.extend(status.hint());
        }

        tracing::trace!(
            mean = stats.mean_brightness,
            std_dev = stats.std_dev,
            side_diff = stats.side_difference,
            ?status,
            "lighting analyzed"
        );

        LightingResult {
            status,
            message: status.message(),
            is_valid: status.is_valid(),
            details,
            stats,
        }
    }
}

/// Perceived brightness of one pixel, 0.0–255.0.
fn luma(r: u8, g: u8, b: u8) -> f64 {
    (LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32) as f64 / LUMA_SCALE
}

/// Returns `(band, final_status)`. The shadow overlay only replaces
/// non-blocking bands; clipped frames keep their band.
fn classify(s: &LightingStats, t: &LightingThresholds) -> (LightingStatus, LightingStatus) {
    if s.mean_brightness > t.too_bright_mean || s.overexposed_fraction > t.max_clipped_fraction {
        return (LightingStatus::TooBright, LightingStatus::TooBright);
    }
    if s.mean_brightness < t.too_dark_mean || s.underexposed_fraction > t.max_clipped_fraction {
        return (LightingStatus::TooDark, LightingStatus::TooDark);
    }

    let band = if s.mean_brightness > t.bright_mean {
        LightingStatus::Bright
    } else if s.mean_brightness < t.dim_mean {
        LightingStatus::Dim
    } else if s.side_difference > t.max_side_difference {
        LightingStatus::Uneven
    } else {
        LightingStatus::Optimal
    };

    if s.std_dev > t.max_std_dev {
        (band, LightingStatus::Shadows)
    } else {
        (band, band)
    }
}
