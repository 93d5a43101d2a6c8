//! Track-level false-positive classification.
//!
//! Two failure modes dominate BRUV detector output: single-frame noise
//! (sub-second tracks) and static false triggers on rocks, bait arms or
//! rope that never move but keep re-firing at low confidence. Both are
//! flagged here from track-level statistics. Rows are only flagged, never
//! discarded, so analysts can always review the raw record.

use serde::{Deserialize, Serialize};

use crate::Detection;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Tracks shorter than this many seconds are false positives.
    pub min_duration_s: f64,
    /// Displacement ratio below this counts as "static".
    pub static_displacement_ratio: f32,
    /// Mean confidence below this counts as "low confidence".
    pub low_mean_confidence: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            min_duration_s: 1.0,
            static_displacement_ratio: 0.08,
            low_mean_confidence: 0.70,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FalsePositiveReason {
    /// Shorter than the minimum duration: single-frame or flicker noise.
    ShortDuration,
    /// Near-motionless and low confidence: a static false trigger.
    StaticLowConfidence,
}

/// Derived statistics and verdict for one track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackSummary {
    pub frame_count: usize,
    pub duration_s: f64,
    /// Max pairwise bbox-center distance over the frame diagonal.
    pub displacement_ratio: f32,
    pub mean_confidence: f32,
    pub peak_confidence: f32,
    pub false_positive: bool,
    pub fp_reason: Option<FalsePositiveReason>,
}

/// Summarize and classify one track.
///
/// `duration_s` is `frame_count / fps`. The duration boundary is
/// inclusive-survives: a track of exactly `min_duration_s` is not flagged
/// by the duration rule. Tracks with fewer than two detections get
/// `displacement_ratio = 0`.
pub fn summarize(
    detections: &[Detection],
    fps: f64,
    frame_diagonal: f32,
    thresholds: &ClassifierThresholds,
) -> TrackSummary {
    let frame_count = detections.len();
    let duration_s = if fps > 0.0 {
        frame_count as f64 / fps
    } else {
        0.0
    };
    let displacement_ratio = displacement_ratio(detections, frame_diagonal);
    let (mean_confidence, peak_confidence) = confidence_stats(detections);

    let fp_reason = if duration_s < thresholds.min_duration_s {
        Some(FalsePositiveReason::ShortDuration)
    } else if displacement_ratio < thresholds.static_displacement_ratio
        && mean_confidence < thresholds.low_mean_confidence
    {
        Some(FalsePositiveReason::StaticLowConfidence)
    } else {
        None
    };

    TrackSummary {
        frame_count,
        duration_s,
        displacement_ratio,
        mean_confidence,
        peak_confidence,
        false_positive: fp_reason.is_some(),
        fp_reason,
    }
}

fn displacement_ratio(detections: &[Detection], frame_diagonal: f32) -> f32 {
    if detections.len() < 2 || frame_diagonal <= 0.0 {
        return 0.0;
    }
    let mut max_distance = 0.0f32;
    for (i, a) in detections.iter().enumerate() {
        for b in &detections[i + 1..] {
            max_distance = max_distance.max(a.bbox.center_distance(&b.bbox));
        }
    }
    max_distance / frame_diagonal
}

fn confidence_stats(detections: &[Detection]) -> (f32, f32) {
    if detections.is_empty() {
        return (0.0, 0.0);
    }
    let sum: f32 = detections.iter().map(|d| d.confidence).sum();
    let peak = detections
        .iter()
        .map(|d| d.confidence)
        .fold(0.0f32, f32::max);
    (sum / detections.len() as f32, peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame_diagonal, BBox};

    fn detection(frame_index: u64, cx: f32, cy: f32, confidence: f32) -> Detection {
        Detection {
            video_id: "v".into(),
            frame_index,
            time_ms: frame_index * 40,
            bbox: BBox::new(cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0),
            confidence,
            original_confidence: confidence,
            track_id: 1,
            species: None,
            species_confidence: None,
            surface_probability: 0.0,
            surface_attenuated: false,
            dedup_group: None,
        }
    }

    fn diag() -> f32 {
        frame_diagonal(1920, 1080)
    }

    #[test]
    fn sub_second_track_is_false_positive_regardless_of_confidence() {
        // 2 frames at 25 fps = 0.08s, confident and fast-moving.
        let dets = vec![
            detection(10, 100.0, 100.0, 0.99),
            detection(11, 900.0, 700.0, 0.99),
        ];
        let summary = summarize(&dets, 25.0, diag(), &ClassifierThresholds::default());
        assert!(summary.false_positive);
        assert_eq!(summary.fp_reason, Some(FalsePositiveReason::ShortDuration));
    }

    #[test]
    fn exactly_one_second_survives_the_duration_rule() {
        // 3 frames at 3 fps = exactly 1.0s; confident, so the static rule
        // cannot fire either.
        let dets = vec![
            detection(10, 100.0, 100.0, 0.9),
            detection(11, 102.0, 100.0, 0.9),
            detection(12, 104.0, 100.0, 0.9),
        ];
        let summary = summarize(&dets, 3.0, diag(), &ClassifierThresholds::default());
        assert!((summary.duration_s - 1.0).abs() < 1e-9);
        assert!(summary.displacement_ratio < 0.08);
        assert!(!summary.false_positive);
    }

    #[test]
    fn just_under_one_second_is_flagged() {
        // 29 frames at 30 fps = 0.9667s.
        let dets: Vec<_> = (0..29)
            .map(|i| detection(i, 100.0 + i as f32 * 30.0, 100.0, 0.9))
            .collect();
        let summary = summarize(&dets, 30.0, diag(), &ClassifierThresholds::default());
        assert!(summary.duration_s < 1.0);
        assert!(summary.false_positive);
        assert_eq!(summary.fp_reason, Some(FalsePositiveReason::ShortDuration));
    }

    #[test]
    fn static_low_confidence_track_is_flagged() {
        // 90 frames at 30 fps = 3s, barely moving, weak confidence.
        let dets: Vec<_> = (0..90)
            .map(|i| detection(i, 100.0 + (i % 2) as f32, 100.0, 0.4))
            .collect();
        let summary = summarize(&dets, 30.0, diag(), &ClassifierThresholds::default());
        assert!(summary.false_positive);
        assert_eq!(
            summary.fp_reason,
            Some(FalsePositiveReason::StaticLowConfidence)
        );
    }

    #[test]
    fn static_rule_needs_both_conditions() {
        let thresholds = ClassifierThresholds::default();
        // Static but confident: survives.
        let confident: Vec<_> = (0..90)
            .map(|i| detection(i, 100.0, 100.0, 0.85))
            .collect();
        let summary = summarize(&confident, 30.0, diag(), &thresholds);
        assert!(!summary.false_positive);

        // Low confidence but swimming across the frame: survives.
        let moving: Vec<_> = (0..90)
            .map(|i| detection(i, 100.0 + i as f32 * 10.0, 100.0, 0.4))
            .collect();
        let summary = summarize(&moving, 30.0, diag(), &thresholds);
        assert!(summary.displacement_ratio >= 0.08);
        assert!(!summary.false_positive);
    }

    #[test]
    fn empty_and_singleton_tracks() {
        let thresholds = ClassifierThresholds::default();
        let empty = summarize(&[], 30.0, diag(), &thresholds);
        assert_eq!(empty.displacement_ratio, 0.0);
        assert!(empty.false_positive);

        let single = summarize(
            &[detection(5, 100.0, 100.0, 0.95)],
            30.0,
            diag(),
            &thresholds,
        );
        assert_eq!(single.displacement_ratio, 0.0);
        assert!(single.false_positive);
        assert_eq!(single.fp_reason, Some(FalsePositiveReason::ShortDuration));
    }
}
