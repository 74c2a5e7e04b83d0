//! Named gating thresholds. Every analyzer reads its limits from here.

use serde::{Deserialize, Serialize};

/// Complete threshold set for one gating session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    pub face: FaceThresholds,
    pub lighting: LightingThresholds,
    pub sharpness: SharpnessThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceThresholds {
    /// Face box width / frame width below this is too far.
    pub min_width_ratio: f32,
    /// Face box width / frame width above this is too close.
    pub max_width_ratio: f32,
    /// Max face-center offset from frame center, as a fraction of frame size.
    pub max_center_offset: f32,
    /// Max roll angle between the eyes, in degrees.
    pub max_tilt_degrees: f32,
    /// Max nose offset from the eye midpoint, as a fraction of face width.
    pub max_yaw_offset: f32,
}

impl Default for FaceThresholds {
    fn default() -> Self {
        Self {
            min_width_ratio: 0.25,
            max_width_ratio: 0.85,
            max_center_offset: 0.15,
            max_tilt_degrees: 15.0,
            max_yaw_offset: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingThresholds {
    /// Analyze every Nth pixel.
    pub sample_stride: usize,
    pub too_bright_mean: f64,
    pub too_dark_mean: f64,
    pub bright_mean: f64,
    pub dim_mean: f64,
    /// Luma above this counts as overexposed.
    pub overexposed_level: f64,
    /// Luma below this counts as underexposed.
    pub underexposed_level: f64,
    /// Fraction of over/underexposed samples that forces TOO_BRIGHT/TOO_DARK.
    pub max_clipped_fraction: f64,
    /// Left/right mean difference above this is uneven lighting.
    pub max_side_difference: f64,
    /// Luma standard deviation above this reports harsh shadows.
    pub max_std_dev: f64,
}

impl Default for LightingThresholds {
    fn default() -> Self {
        Self {
            sample_stride: 4,
            too_bright_mean: 220.0,
            too_dark_mean: 50.0,
            bright_mean: 190.0,
            dim_mean: 80.0,
            overexposed_level: 240.0,
            underexposed_level: 30.0,
            max_clipped_fraction: 0.40,
            max_side_difference: 50.0,
            max_std_dev: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpnessThresholds {
    /// Minimum original capture width and height, in pixels.
    pub min_resolution: u32,
    /// Scores below this are reported as blurry.
    pub min_score: f64,
    /// Multiplier applied to the mean neighbour difference.
    pub score_scale: f64,
}

impl Default for SharpnessThresholds {
    fn default() -> Self {
        Self {
            min_resolution: 200,
            min_score: 100.0,
            score_scale: 5.0,
        }
    }
}
