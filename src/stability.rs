//! Deployment-window detection.
//!
//! BRUV recordings start with the rig sinking and end with it being hauled
//! up; both phases are violent camera motion that floods the detector with
//! garbage. This module samples inter-frame motion across the whole video
//! and selects the longest contiguous low-motion run as the stable window.
//!
//! The analyzer is advisory and must never abort the pipeline: on
//! unreadable frames, short videos, or an entirely unstable recording it
//! falls back to the middle 80% of the runtime and flags the window as a
//! fallback.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::{FrameSource, LumaFrame, VideoMeta};

/// Motion frames are compared at this reduced resolution regardless of
/// source resolution.
const ANALYSIS_WIDTH: u32 = 320;
const ANALYSIS_HEIGHT: u32 = 180;

/// Per-pixel delta above this counts as "changed" for the motion mask.
const CHANGE_THRESHOLD: u8 = 25;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Seconds between sampled frames.
    pub sample_interval_s: f64,
    /// Smoothed motion below this is stable. Range (0, 1).
    pub stability_threshold: f32,
    /// Minimum length of a stable run to qualify, in seconds.
    pub min_stable_duration_s: f64,
    /// Moving-average window over the motion series (1 = no smoothing).
    pub smoothing_window: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            sample_interval_s: 2.0,
            stability_threshold: 0.15,
            min_stable_duration_s: 10.0,
            smoothing_window: 5,
        }
    }
}

/// The portion of a recording judged to be the camera at rest.
///
/// Exactly one per video; `is_fallback` marks windows produced by the
/// middle-80% fallback rather than motion evidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityWindow {
    pub start_ms: u64,
    pub end_ms: u64,
    pub is_fallback: bool,
}

impl StabilityWindow {
    pub fn contains_ms(&self, time_ms: u64) -> bool {
        time_ms >= self.start_ms && time_ms <= self.end_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    fn fallback(meta: &VideoMeta) -> Self {
        let margin = meta.duration_ms / 10;
        Self {
            start_ms: margin,
            end_ms: meta.duration_ms - margin,
            is_fallback: true,
        }
    }
}

/// Motion score for one consecutive frame pair, normalized to [0, 1].
///
/// Weighted sum of the changed-pixel fraction, the mean intensity delta
/// and the peak intensity delta (0.6 / 0.3 / 0.1).
pub fn motion_score(prev: &LumaFrame, curr: &LumaFrame) -> f32 {
    debug_assert_eq!(prev.pixels.len(), curr.pixels.len());
    let total = prev.pixels.len().max(1) as f32;
    let mut changed = 0u64;
    let mut sum_delta = 0u64;
    let mut max_delta = 0u8;
    for (a, b) in prev.pixels.iter().zip(&curr.pixels) {
        let delta = (*a as i16 - *b as i16).unsigned_abs() as u8;
        if delta > CHANGE_THRESHOLD {
            changed += 1;
        }
        sum_delta += delta as u64;
        max_delta = max_delta.max(delta);
    }
    let changed_fraction = changed as f32 / total;
    let mean_delta = sum_delta as f32 / total / 255.0;
    let peak_delta = max_delta as f32 / 255.0;
    0.6 * changed_fraction + 0.3 * mean_delta + 0.1 * peak_delta
}

/// Centered moving average, clamped at the series edges.
fn smooth(scores: &[f32], window: usize) -> Vec<f32> {
    let window = window.max(1).min(scores.len().max(1));
    let half = window / 2;
    scores
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(scores.len());
            scores[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}

/// Analyze a video and select its stable window.
///
/// `meta` is passed in by the caller (who already needed it); frame read
/// errors inside the scan degrade to the fallback window instead of
/// propagating.
pub fn analyze(source: &mut dyn FrameSource, meta: &VideoMeta, cfg: &StabilityConfig) -> StabilityWindow {
    let min_stable_ms = (cfg.min_stable_duration_s * 1000.0) as u64;
    if meta.duration_ms < 2 * min_stable_ms {
        log::warn!(
            "video too short for stability analysis ({} ms), using middle 80%",
            meta.duration_ms
        );
        return StabilityWindow::fallback(meta);
    }

    let scores = match sample_motion(source, meta, cfg) {
        Ok(scores) if !scores.is_empty() => scores,
        Ok(_) => {
            log::warn!("no motion samples collected, using middle 80%");
            return StabilityWindow::fallback(meta);
        }
        Err(e) => {
            log::warn!("stability scan failed ({}), using middle 80%", e);
            return StabilityWindow::fallback(meta);
        }
    };

    let smoothed = smooth(&scores, cfg.smoothing_window);
    let interval_ms = (cfg.sample_interval_s * 1000.0) as u64;

    match longest_stable_run(&smoothed, cfg.stability_threshold, interval_ms, min_stable_ms) {
        Some((start_idx, end_idx)) => {
            // Score k covers the pair (sample k, sample k+1). The window
            // starts at the first stable pair's start sample (deployment
            // motion was still observed in the pair before it) and ends at
            // the far edge of the first unstable pair after the run
            // (retrieval motion begins somewhere inside that pair).
            let start_ms = start_idx as u64 * interval_ms;
            let end_ms = ((end_idx as u64 + 2) * interval_ms).min(meta.duration_ms);
            StabilityWindow {
                start_ms,
                end_ms,
                is_fallback: false,
            }
        }
        None => {
            log::warn!("no stable run >= {:.0}s found, using middle 80%", cfg.min_stable_duration_s);
            StabilityWindow::fallback(meta)
        }
    }
}

/// Sample frames at the configured interval and score consecutive pairs.
/// Score `k` describes the pair (sample k, sample k+1).
fn sample_motion(
    source: &mut dyn FrameSource,
    meta: &VideoMeta,
    cfg: &StabilityConfig,
) -> Result<Vec<f32>> {
    let interval_ms = (cfg.sample_interval_s * 1000.0) as u64;
    let mut scores = Vec::new();
    let mut prev: Option<LumaFrame> = None;
    let mut t = 0u64;
    while t <= meta.duration_ms {
        let full = source.luma_frame_at(t)?;
        let frame = full.resample(
            full.width.min(ANALYSIS_WIDTH),
            full.height.min(ANALYSIS_HEIGHT),
        );
        if let Some(prev) = &prev {
            scores.push(motion_score(prev, &frame));
        }
        prev = Some(frame);
        t += interval_ms;
    }
    Ok(scores)
}

/// Longest contiguous run of scores below the threshold spanning at least
/// `min_stable_ms`. Returns score indices (inclusive).
fn longest_stable_run(
    smoothed: &[f32],
    threshold: f32,
    interval_ms: u64,
    min_stable_ms: u64,
) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;
    for (i, &score) in smoothed.iter().enumerate() {
        if score < threshold {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            best = pick_longer(best, (start, i - 1));
        }
    }
    if let Some(start) = run_start {
        best = pick_longer(best, (start, smoothed.len() - 1));
    }
    best.filter(|(start, end)| ((end - start + 1) as u64) * interval_ms >= min_stable_ms)
}

fn pick_longer(best: Option<(usize, usize)>, candidate: (usize, usize)) -> Option<(usize, usize)> {
    match best {
        Some((s, e)) if (e - s) >= (candidate.1 - candidate.0) => Some((s, e)),
        _ => Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SyntheticSource;

    fn meta(duration_ms: u64) -> VideoMeta {
        VideoMeta {
            duration_ms,
            fps: 24.0,
            width: 320,
            height: 180,
        }
    }

    fn cfg_no_smoothing() -> StabilityConfig {
        StabilityConfig {
            smoothing_window: 1,
            ..StabilityConfig::default()
        }
    }

    #[test]
    fn detects_stable_window_between_deployment_and_retrieval() {
        // 1200s video, unstable during [0,140)s and [1180,1200)s.
        let m = meta(1_200_000);
        let mut src = SyntheticSource::new(m)
            .with_unstable_span(0, 140_000)
            .with_unstable_span(1_180_000, 1_200_000);
        let window = analyze(&mut src, &m, &cfg_no_smoothing());
        assert!(!window.is_fallback);
        assert_eq!(window.start_ms, 140_000);
        assert_eq!(window.end_ms, 1_180_000);
    }

    #[test]
    fn window_bounds_are_ordered_and_within_video() {
        let m = meta(600_000);
        let mut src = SyntheticSource::new(m).with_unstable_span(0, 60_000);
        let window = analyze(&mut src, &m, &cfg_no_smoothing());
        assert!(window.start_ms < window.end_ms);
        assert!(window.end_ms <= m.duration_ms);
    }

    #[test]
    fn fully_stable_video_covers_whole_runtime() {
        let m = meta(120_000);
        let mut src = SyntheticSource::new(m);
        let window = analyze(&mut src, &m, &cfg_no_smoothing());
        assert!(!window.is_fallback);
        assert_eq!(window.start_ms, 0);
        assert_eq!(window.end_ms, 120_000);
    }

    #[test]
    fn entirely_unstable_video_falls_back_to_middle_80_percent() {
        let m = meta(100_000);
        let mut src = SyntheticSource::new(m).with_unstable_span(0, 100_000);
        let window = analyze(&mut src, &m, &cfg_no_smoothing());
        assert!(window.is_fallback);
        assert_eq!(window.start_ms, 10_000);
        assert_eq!(window.end_ms, 90_000);
    }

    #[test]
    fn short_video_falls_back_without_scanning() {
        // Shorter than twice the minimum stable duration.
        let m = meta(15_000);
        let mut src = SyntheticSource::new(m);
        let window = analyze(&mut src, &m, &StabilityConfig::default());
        assert!(window.is_fallback);
        assert_eq!(window.start_ms, 1_500);
        assert_eq!(window.end_ms, 13_500);
    }

    #[test]
    fn motion_score_is_zero_for_identical_frames() {
        let frame = LumaFrame {
            width: 4,
            height: 4,
            pixels: vec![100; 16],
        };
        assert_eq!(motion_score(&frame, &frame), 0.0);
    }

    #[test]
    fn motion_score_saturates_toward_one_for_full_change() {
        let black = LumaFrame {
            width: 4,
            height: 4,
            pixels: vec![0; 16],
        };
        let white = LumaFrame {
            width: 4,
            height: 4,
            pixels: vec![255; 16],
        };
        let score = motion_score(&black, &white);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn smoothing_averages_neighbors() {
        let smoothed = smooth(&[0.0, 1.0, 0.0], 3);
        assert!((smoothed[1] - (1.0 / 3.0)).abs() < 1e-6);
    }
}
