//! BRUV annotation cleansing and MaxN aggregation pipeline.
//!
//! Converts raw detector/tracker output from baited remote underwater video
//! (BRUV) deployments into per-species abundance metrics.
//!
//! # Architecture
//!
//! Per-video flow:
//!
//! 1. `stability`: find the stable (post-deployment, pre-retrieval) window
//!    from sampled inter-frame motion.
//! 2. `detect`: external detector/tracker boundary (bounding boxes, track
//!    ids, confidences per frame, trusted as-is).
//! 3. `surface`: attenuate confidence of detections that look like surface
//!    artifacts (waves, floating debris). Never deletes rows.
//! 4. `dedup`: collapse near-duplicate detections into dedup groups.
//! 5. `classify`: per-track false-positive flagging from duration,
//!    displacement and confidence.
//! 6. `maxn`: per-species maximum simultaneous count with supporting
//!    evidence.
//!
//! `cleanse` composes steps 1-5 into one per-video stage; `batch` fans the
//! whole pipeline out across a directory of videos with process isolation,
//! a persisted resumable job ledger, and a final consolidation step.
//!
//! # Module Structure
//!
//! - `frame`: frame access seam (`FrameSource`) + synthetic test source
//! - `detect`: tracker/classifier traits + scripted test backend
//! - `storage`: SQLite detection/MaxN tables and the batch job ledger
//! - `config`: TOML config with env overrides and fail-fast validation

use serde::{Deserialize, Serialize};

pub mod batch;
pub mod classify;
pub mod cleanse;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod frame;
pub mod maxn;
pub mod stability;
pub mod storage;
pub mod surface;

pub use classify::{ClassifierThresholds, FalsePositiveReason, TrackSummary};
pub use cleanse::{CleanseOutcome, Cleanser};
pub use config::{BatchConfig, PipelineConfig};
pub use detect::{RawDetection, ScriptedBackend, SpeciesClassifier, TrackerBackend};
pub use frame::{FrameSource, LumaFrame, RgbCrop, SyntheticSource, VideoMeta};
pub use maxn::{ChapterKey, MaxNRecord};
pub use stability::{StabilityConfig, StabilityWindow};
pub use storage::{InMemoryLedger, JobLedger, PipelineStore, SqliteLedger, SqliteStore};
pub use surface::{SurfaceAssessment, SurfaceConfig, SurfaceFilter};

/// Species bucket for detections that never received a label.
///
/// Accumulated during aggregation but excluded from final MaxN reporting
/// until an analyst (or the optional classifier) labels the tracks.
pub const UNCLASSIFIED_SPECIES: &str = "unclassified";

// -------------------- Bounding boxes --------------------

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0)
    }

    /// Box center (cx, cy).
    pub fn center(&self) -> (f32, f32) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &BBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Diagonal of a frame in pixels. Used to normalize track displacement.
pub fn frame_diagonal(width: u32, height: u32) -> f32 {
    ((width as f32).powi(2) + (height as f32).powi(2)).sqrt()
}

// -------------------- Detections and tracks --------------------

/// One detector/tracker observation in one frame of one video.
///
/// Rows are append-only: the cleanser adjusts `confidence` and fills the
/// audit fields (`surface_probability`, `dedup_group`, ...) but never
/// discards a row, so manual QC review always sees the full record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub video_id: String,
    pub frame_index: u64,
    pub time_ms: u64,
    pub bbox: BBox,
    /// Working confidence, possibly attenuated by the surface filter.
    pub confidence: f32,
    /// Confidence as reported by the detector, before any attenuation.
    pub original_confidence: f32,
    /// Track id assigned by the external tracker. Stable within one video.
    pub track_id: u64,
    pub species: Option<String>,
    pub species_confidence: Option<f32>,
    /// Raw surface-artifact probability, recorded for audit.
    pub surface_probability: f32,
    pub surface_attenuated: bool,
    pub dedup_group: Option<u64>,
}

impl Detection {
    /// Species bucket used for aggregation. Unlabeled detections fall into
    /// the placeholder bucket.
    pub fn species_bucket(&self) -> &str {
        self.species.as_deref().unwrap_or(UNCLASSIFIED_SPECIES)
    }
}

/// Ordered detections sharing one track id within one video.
///
/// Immutable once the cleanser finishes a video.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub track_id: u64,
    pub detections: Vec<Detection>,
    pub summary: TrackSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_center_and_distance() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(3.0, 4.0, 13.0, 14.0);
        assert_eq!(a.center(), (5.0, 5.0));
        assert!((a.center_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn frame_diagonal_matches_pythagoras() {
        assert!((frame_diagonal(1920, 1080) - 2202.9071).abs() < 1e-2);
        assert!((frame_diagonal(3, 4) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn species_bucket_defaults_to_placeholder() {
        let d = Detection {
            video_id: "v".into(),
            frame_index: 0,
            time_ms: 0,
            bbox: BBox::default(),
            confidence: 0.5,
            original_confidence: 0.5,
            track_id: 1,
            species: None,
            species_confidence: None,
            surface_probability: 0.0,
            surface_attenuated: false,
            dedup_group: None,
        };
        assert_eq!(d.species_bucket(), UNCLASSIFIED_SPECIES);
    }
}
