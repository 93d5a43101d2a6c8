//! Surface-artifact likelihood scoring.
//!
//! Waves, glare and floating debris near the surface trip the detector
//! constantly on shallow deployments. This filter estimates the
//! probability that a detection is a surface artifact and attenuates its
//! confidence when that probability crosses a threshold. It never deletes
//! a detection; the raw probability is kept on the row for audit and the
//! accept/reject call stays with the track classifier.

use serde::{Deserialize, Serialize};

use crate::frame::RgbCrop;
use crate::BBox;

// Component weights. They sum to 1.0.
const W_TOP_POSITION: f32 = 0.30;
const W_HORIZON_PROXIMITY: f32 = 0.25;
const W_BLUE_VARIANCE: f32 = 0.25;
const W_TEXTURE: f32 = 0.20;

/// Blue-channel variance is normalized against this ceiling.
const BLUE_VARIANCE_CEILING: f32 = 10_000.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Camera tilt below horizontal, degrees. Used with depth to place the
    /// expected horizon row.
    pub camera_tilt_deg: f32,
    /// Probability above which confidence is attenuated.
    pub surface_threshold: f32,
    /// Attenuation strength in [0, 1]; 0.5 halves confidence at p = 1.
    pub confidence_penalty: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            camera_tilt_deg: 45.0,
            surface_threshold: 0.7,
            confidence_penalty: 0.5,
        }
    }
}

/// Outcome of scoring one detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceAssessment {
    /// Surface-artifact probability in [0, 1].
    pub probability: f32,
    /// Confidence after attenuation. Never above the input confidence.
    pub adjusted_confidence: f32,
    pub attenuated: bool,
}

pub struct SurfaceFilter {
    cfg: SurfaceConfig,
}

impl SurfaceFilter {
    pub fn new(cfg: SurfaceConfig) -> Self {
        Self { cfg }
    }

    /// Normalized frame row (0 = top) where the surface is expected.
    ///
    /// Deeper deployments see the surface higher in the frame; with no
    /// depth telemetry the surface is assumed in the top fifth. Tilt
    /// shifts the row: a camera pitched further down pushes the horizon
    /// toward the frame top.
    pub fn expected_horizon_row(&self, depth_m: Option<f32>) -> f32 {
        let band = match depth_m {
            None => 0.20,
            Some(d) if d <= 0.0 => 0.20,
            Some(d) if d < 2.0 => 0.15,
            Some(d) if d < 5.0 => 0.10,
            Some(d) if d < 10.0 => 0.05,
            Some(_) => 0.02,
        };
        let tilt_factor = (45.0 / self.cfg.camera_tilt_deg.clamp(10.0, 80.0)).clamp(0.5, 1.5);
        (band * tilt_factor).clamp(0.0, 0.5)
    }

    /// Surface-artifact probability for one detection.
    pub fn probability(
        &self,
        bbox: &BBox,
        frame_height: u32,
        crop: Option<&RgbCrop>,
        depth_m: Option<f32>,
    ) -> f32 {
        let frame_height = frame_height.max(1) as f32;
        let vertical_position = (bbox.ymin / frame_height).clamp(0.0, 1.0);
        let top_position_score = 1.0 - vertical_position;

        let expected_row = self.expected_horizon_row(depth_m);
        let horizon_score = (1.0 - (vertical_position - expected_row).abs() * 5.0).max(0.0);

        let (blue_score, texture_score) = match crop {
            Some(crop) => (blue_variance_score(crop), texture_score(crop)),
            // No pixels available: position evidence only.
            None => (0.0, 0.0),
        };

        (W_TOP_POSITION * top_position_score
            + W_HORIZON_PROXIMITY * horizon_score
            + W_BLUE_VARIANCE * blue_score
            + W_TEXTURE * texture_score)
            .clamp(0.0, 1.0)
    }

    /// Score a detection and attenuate its confidence when the probability
    /// crosses the configured threshold.
    pub fn assess(
        &self,
        bbox: &BBox,
        frame_height: u32,
        crop: Option<&RgbCrop>,
        depth_m: Option<f32>,
        confidence: f32,
    ) -> SurfaceAssessment {
        let probability = self.probability(bbox, frame_height, crop, depth_m);
        if probability > self.cfg.surface_threshold {
            SurfaceAssessment {
                probability,
                adjusted_confidence: confidence
                    * (1.0 - probability * self.cfg.confidence_penalty),
                attenuated: true,
            }
        } else {
            SurfaceAssessment {
                probability,
                adjusted_confidence: confidence,
                attenuated: false,
            }
        }
    }
}

/// Wave texture shows up as high blue-channel variance inside the box.
fn blue_variance_score(crop: &RgbCrop) -> f32 {
    let n = (crop.width * crop.height) as f32;
    if n < 1.0 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..crop.height {
        for x in 0..crop.width {
            let b = crop.channel(x, y, 2) as f64;
            sum += b;
            sum_sq += b * b;
        }
    }
    let mean = sum / n as f64;
    let variance = (sum_sq / n as f64 - mean * mean).max(0.0) as f32;
    (variance / BLUE_VARIANCE_CEILING).min(1.0)
}

/// Edge density plus mean gradient magnitude from a 3x3 Sobel pass over
/// the crop's luma. Surface chop has dense, irregular edges.
fn texture_score(crop: &RgbCrop) -> f32 {
    let luma = crop.to_luma();
    if luma.width < 3 || luma.height < 3 {
        return 0.0;
    }
    let mut edge_pixels = 0u64;
    let mut gradient_sum = 0.0f64;
    let interior = ((luma.width - 2) * (luma.height - 2)) as f64;
    for y in 1..luma.height - 1 {
        for x in 1..luma.width - 1 {
            let p = |dx: i32, dy: i32| {
                luma.pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32) as f32
            };
            let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1))
                - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1))
                - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude > 128.0 {
                edge_pixels += 1;
            }
            gradient_sum += (magnitude / 1020.0) as f64; // max Sobel response
        }
    }
    let edge_density = edge_pixels as f64 / interior;
    let mean_gradient = gradient_sum / interior;
    ((0.5 * edge_density + 0.5 * mean_gradient) as f32).min(1.0)
}
