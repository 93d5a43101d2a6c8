use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::classify::ClassifierThresholds;
use crate::dedup::DedupConfig;
use crate::stability::StabilityConfig;
use crate::surface::SurfaceConfig;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_MEMORY_PER_WORKER_GB: f64 = 2.0;
const DEFAULT_REQUESTED_CAP: usize = 16;
const DEFAULT_RESERVED_CORES: usize = 1;
const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    confidence_threshold: Option<f32>,
    auto_skip_deployment: Option<bool>,
    depth_m: Option<f32>,
    group_chapters: Option<bool>,
    stability: Option<StabilityConfig>,
    surface: Option<SurfaceConfig>,
    dedup: Option<DedupConfig>,
    tracks: Option<ClassifierThresholds>,
    batch: Option<BatchConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BatchConfigFile {
    workers: Option<usize>,
    memory_per_worker_gb: Option<f64>,
    requested_cap: Option<usize>,
    reserved_cores: Option<usize>,
    video_extensions: Option<Vec<String>>,
}

/// Per-video processing knobs. Loaded once and shared by every job in a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Detections below this confidence are dropped before any other stage.
    pub confidence_threshold: f32,
    /// Gate each video on its stable deployment window. When false the whole
    /// timeline is processed.
    pub auto_skip_deployment: bool,
    /// Deployment depth in metres, when the operator knows it. Tightens the
    /// surface filter's horizon estimate.
    pub depth_m: Option<f32>,
    /// Merge GoPro chapter files into one logical deployment before MaxN.
    pub group_chapters: bool,
    pub stability: StabilityConfig,
    pub surface: SurfaceConfig,
    pub dedup: DedupConfig,
    pub tracks: ClassifierThresholds,
}

/// Orchestrator-level knobs for batch runs.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Explicit worker count. When unset the count is derived from cores and
    /// available memory.
    pub workers: Option<usize>,
    pub memory_per_worker_gb: f64,
    pub requested_cap: usize,
    pub reserved_cores: usize,
    pub video_extensions: Vec<String>,
}

impl PipelineConfig {
    /// Reads the TOML file named by `BRUV_CONFIG` (if any), applies `BRUV_*`
    /// env overrides, then validates. Errors are fatal by design so a bad
    /// setting cannot silently skew a survey.
    pub fn load() -> Result<(Self, BatchConfig)> {
        let config_path = std::env::var("BRUV_CONFIG").ok();
        let mut file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => PipelineConfigFile::default(),
        };
        let batch_file = file_cfg.batch.take();
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        let mut batch = BatchConfig::from_file(batch_file.unwrap_or_default());
        batch.apply_env()?;
        batch.validate()?;
        Ok((cfg, batch))
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        Self {
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            auto_skip_deployment: file.auto_skip_deployment.unwrap_or(true),
            depth_m: file.depth_m,
            group_chapters: file.group_chapters.unwrap_or(true),
            stability: file.stability.unwrap_or_default(),
            surface: file.surface.unwrap_or_default(),
            dedup: file.dedup.unwrap_or_default(),
            tracks: file.tracks.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("BRUV_CONF_THRESHOLD") {
            self.confidence_threshold = raw
                .parse()
                .map_err(|_| anyhow!("BRUV_CONF_THRESHOLD must be a number in [0, 1]"))?;
        }
        if let Ok(raw) = std::env::var("BRUV_STABILITY_THRESHOLD") {
            self.stability.stability_threshold = raw
                .parse()
                .map_err(|_| anyhow!("BRUV_STABILITY_THRESHOLD must be a number"))?;
        }
        if let Ok(raw) = std::env::var("BRUV_DEPTH_M") {
            if raw.trim().is_empty() {
                self.depth_m = None;
            } else {
                let depth: f32 = raw
                    .parse()
                    .map_err(|_| anyhow!("BRUV_DEPTH_M must be a depth in metres"))?;
                self.depth_m = Some(depth);
            }
        }
        if let Ok(raw) = std::env::var("BRUV_AUTO_SKIP") {
            self.auto_skip_deployment = parse_bool("BRUV_AUTO_SKIP", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1]"));
        }
        if self.stability.sample_interval_s <= 0.0 {
            return Err(anyhow!("stability sample_interval_s must be positive"));
        }
        if self.stability.stability_threshold <= 0.0 {
            return Err(anyhow!("stability_threshold must be positive"));
        }
        if self.stability.smoothing_window == 0 {
            return Err(anyhow!("smoothing_window must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.surface.surface_threshold) {
            return Err(anyhow!("surface_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.surface.confidence_penalty) {
            return Err(anyhow!("surface confidence_penalty must be within [0, 1]"));
        }
        if let Some(depth) = self.depth_m {
            if depth < 0.0 {
                return Err(anyhow!("depth_m must not be negative"));
            }
        }
        if self.dedup.cache_capacity == 0 {
            return Err(anyhow!("dedup cache_capacity must be at least 1"));
        }
        if self.tracks.min_duration_s < 0.0 {
            return Err(anyhow!("tracks min_duration_s must not be negative"));
        }
        Ok(())
    }
}

impl BatchConfig {
    fn from_file(file: BatchConfigFile) -> Self {
        Self {
            workers: file.workers,
            memory_per_worker_gb: file
                .memory_per_worker_gb
                .unwrap_or(DEFAULT_MEMORY_PER_WORKER_GB),
            requested_cap: file.requested_cap.unwrap_or(DEFAULT_REQUESTED_CAP),
            reserved_cores: file.reserved_cores.unwrap_or(DEFAULT_RESERVED_CORES),
            video_extensions: file.video_extensions.unwrap_or_else(|| {
                DEFAULT_VIDEO_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("BRUV_WORKERS") {
            let workers: usize = raw
                .parse()
                .map_err(|_| anyhow!("BRUV_WORKERS must be a positive integer"))?;
            self.workers = Some(workers);
        }
        if let Ok(raw) = std::env::var("BRUV_MEMORY_PER_WORKER_GB") {
            self.memory_per_worker_gb = raw
                .parse()
                .map_err(|_| anyhow!("BRUV_MEMORY_PER_WORKER_GB must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(anyhow!("workers must be at least 1"));
            }
        }
        if self.memory_per_worker_gb <= 0.0 {
            return Err(anyhow!("memory_per_worker_gb must be positive"));
        }
        if self.requested_cap == 0 {
            return Err(anyhow!("requested_cap must be at least 1"));
        }
        if self.video_extensions.is_empty() {
            return Err(anyhow!("video_extensions must not be empty"));
        }
        Ok(())
    }

    /// Case-insensitive extension match against the configured list.
    pub fn matches_extension(&self, path: &Path) -> bool {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return false,
        };
        self.video_extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(&ext))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_file(BatchConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{name} must be a boolean (true/false)")),
    }
}
