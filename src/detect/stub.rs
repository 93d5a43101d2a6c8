use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::backend::{RawDetection, SpeciesClassifier, SpeciesGuess, TrackerBackend};
use crate::frame::{LumaFrame, RgbCrop, VideoMeta};

/// On-disk handoff format from an external detector/tracker.
///
/// Real detection models run out-of-process and leave one sidecar per
/// video (`<video>.detections.json`) holding the probed metadata and the
/// per-frame raw observations. The worker plays the sidecar back through
/// `ScriptedBackend` and cleanses it like any live backend output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotationSidecar {
    pub meta: VideoMeta,
    /// Frame index -> raw observations in that frame.
    #[serde(default)]
    pub detections: HashMap<u64, Vec<RawDetection>>,
    /// Time spans `[start_ms, end_ms)` the synthetic playback source should
    /// render as camera motion. Ignored when a real decoder is plugged in.
    #[serde(default)]
    pub unstable_spans_ms: Vec<(u64, u64)>,
}

impl AnnotationSidecar {
    /// Sidecar path convention for a given video file.
    pub fn path_for(video: &Path) -> PathBuf {
        let mut name = video.as_os_str().to_os_string();
        name.push(".detections.json");
        PathBuf::from(name)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading annotation sidecar {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid annotation sidecar {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing annotation sidecar {}", path.display()))
    }
}

/// Playback backend. Replays a fixed per-frame detection script, built
/// inline by tests or loaded from an annotation sidecar.
pub struct ScriptedBackend {
    script: HashMap<u64, Vec<RawDetection>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
        }
    }

    pub fn push(&mut self, frame_index: u64, detection: RawDetection) {
        self.script.entry(frame_index).or_default().push(detection);
    }

    pub fn from_script(entries: Vec<(u64, RawDetection)>) -> Self {
        let mut backend = Self::new();
        for (frame_index, detection) in entries {
            backend.push(frame_index, detection);
        }
        backend
    }

    pub fn from_sidecar(sidecar: &AnnotationSidecar) -> Self {
        Self {
            script: sidecar.detections.clone(),
        }
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &LumaFrame, frame_index: u64) -> Result<Vec<RawDetection>> {
        Ok(self.script.get(&frame_index).cloned().unwrap_or_default())
    }
}

/// Classifier stub that labels every crop with one species.
pub struct FixedLabelClassifier {
    pub label: String,
    pub confidence: f32,
}

impl SpeciesClassifier for FixedLabelClassifier {
    fn name(&self) -> &'static str {
        "fixed-label"
    }

    fn classify(&mut self, _crop: &RgbCrop) -> Result<SpeciesGuess> {
        Ok(Some((self.label.clone(), self.confidence)))
    }
}
