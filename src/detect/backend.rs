use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::{LumaFrame, RgbCrop};
use crate::BBox;

/// One raw observation from the external detector/tracker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BBox,
    pub confidence: f32,
    /// Tracker-assigned id. See the `TrackerBackend` contract.
    pub track_id: u64,
    /// Class label from the detection model, when it produces one.
    /// Unlabeled observations land in the unclassified bucket.
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub species_confidence: Option<f32>,
}

/// External detector/tracker boundary.
///
/// # Contract
///
/// Track-id assignment is entirely the backend's responsibility and is
/// trusted as-is. The pipeline assumes exactly two things about ids:
///
/// - stable within one video (the same physical object keeps its id), and
/// - unique per tracked object within that video.
///
/// Nothing else: not density, not ordering, not small integers. Any
/// detector/tracker implementation honoring that can be substituted.
pub trait TrackerBackend {
    /// Backend identifier, used in logs and the output tables.
    fn name(&self) -> &'static str;

    /// Run detection + tracking on one frame, in frame-index order.
    ///
    /// Implementations must treat the pixel data as read-only and
    /// ephemeral. Zero detections is a normal result, not an error.
    fn detect(&mut self, frame: &LumaFrame, frame_index: u64) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook (model loading, first-inference JIT).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Classifier verdict for one detection crop.
///
/// `None` means the classifier's confidence fell below its floor and the
/// detection stays in the unclassified bucket.
pub type SpeciesGuess = Option<(String, f32)>;

/// Optional per-detection species classifier.
pub trait SpeciesClassifier {
    fn name(&self) -> &'static str;

    fn classify(&mut self, crop: &RgbCrop) -> Result<SpeciesGuess>;
}
