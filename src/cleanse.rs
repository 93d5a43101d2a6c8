//! Per-video cleansing stage.
//!
//! Composes the stability gate, the tracker boundary, the surface filter,
//! deduplication and track classification into one pass over a video, then
//! computes MaxN from the surviving detections. Detection rows are
//! append-only: confidences are adjusted and audit fields filled in, but a
//! row that entered the pipeline is never discarded.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::classify;
use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::detect::{AnnotationSidecar, ScriptedBackend, SpeciesClassifier, TrackerBackend};
use crate::frame::{FrameSource, SyntheticSource, VideoMeta};
use crate::maxn::{self, MaxNRecord};
use crate::stability::{self, StabilityWindow};
use crate::surface::SurfaceFilter;
use crate::{frame_diagonal, BBox, Detection, Track};

/// Counters for one cleansed video. Persisted alongside the detections so
/// batch summaries can be produced without re-reading every row.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CleanseStats {
    pub frames_scanned: u64,
    pub frames_failed: u64,
    pub raw_detections: u64,
    /// Raw detections dropped at ingest for falling below the confidence
    /// threshold. These never become rows.
    pub below_threshold: u64,
    pub surface_attenuated: u64,
    pub tracks_total: usize,
    pub tracks_false_positive: usize,
}

/// Everything produced by cleansing one video.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanseOutcome {
    pub video_id: String,
    pub meta: VideoMeta,
    pub window: StabilityWindow,
    /// All tracks, surviving and flagged, renumbered contiguously.
    pub tracks: Vec<Track>,
    /// MaxN over surviving tracks only.
    pub maxn: Vec<MaxNRecord>,
    pub stats: CleanseStats,
    /// First track id free for the next chapter of the same deployment.
    pub next_track_index: u64,
}

impl CleanseOutcome {
    /// Tracks that survived false-positive classification.
    pub fn surviving_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| !t.summary.false_positive)
    }
}

/// Per-track state accumulated during the frame sweep.
struct TrackBuilder {
    detections: Vec<Detection>,
    first_frame: u64,
    /// Highest-confidence observation, kept so the optional species
    /// classifier sees the best available crop.
    best: (f32, u64, BBox),
}

pub struct Cleanser {
    cfg: PipelineConfig,
    surface: SurfaceFilter,
    dedup: Deduplicator,
}

impl Cleanser {
    pub fn new(cfg: PipelineConfig) -> Self {
        let surface = SurfaceFilter::new(cfg.surface.clone());
        let dedup = Deduplicator::new(cfg.dedup.clone());
        Self {
            cfg,
            surface,
            dedup,
        }
    }

    /// Run the full cleansing pass over one video.
    ///
    /// `next_track_index` is the first track id this video may hand out;
    /// chapters of one deployment thread it through so final ids never
    /// collide. The returned outcome carries the updated index.
    pub fn cleanse(
        &mut self,
        video_id: &str,
        source: &mut dyn FrameSource,
        backend: &mut dyn TrackerBackend,
        mut classifier: Option<&mut dyn SpeciesClassifier>,
        next_track_index: u64,
    ) -> Result<CleanseOutcome> {
        let meta = source
            .meta()
            .with_context(|| format!("probing video {video_id}"))?;
        let window = if self.cfg.auto_skip_deployment {
            stability::analyze(source, &meta, &self.cfg.stability)
        } else {
            StabilityWindow {
                start_ms: 0,
                end_ms: meta.duration_ms,
                is_fallback: false,
            }
        };
        debug!(
            "{video_id}: stable window {}..{} ms (fallback={})",
            window.start_ms, window.end_ms, window.is_fallback
        );

        backend
            .warm_up()
            .with_context(|| format!("warming up backend {}", backend.name()))?;
        self.dedup.reset();

        let mut stats = CleanseStats::default();
        // Raw tracker id -> builder. Renumbering happens after the sweep.
        let mut builders: HashMap<u64, TrackBuilder> = HashMap::new();

        for frame_index in 0..meta.frame_count() {
            let time_ms = ((frame_index as f64 / meta.fps) * 1000.0).round() as u64;
            if !window.contains_ms(time_ms) {
                continue;
            }
            let luma = match source.luma_frame_at(time_ms) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("{video_id}: frame {frame_index} unreadable, skipping: {e:#}");
                    stats.frames_failed += 1;
                    continue;
                }
            };
            stats.frames_scanned += 1;

            let raw = backend
                .detect(&luma, frame_index)
                .with_context(|| format!("{video_id}: detector failed at frame {frame_index}"))?;
            stats.raw_detections += raw.len() as u64;

            for obs in raw {
                if obs.confidence < self.cfg.confidence_threshold {
                    stats.below_threshold += 1;
                    continue;
                }
                let crop = match source.rgb_crop_at(time_ms, &obs.bbox) {
                    Ok(crop) => Some(crop),
                    Err(e) => {
                        debug!("{video_id}: crop unavailable at frame {frame_index}: {e:#}");
                        None
                    }
                };
                let assessment = self.surface.assess(
                    &obs.bbox,
                    meta.height,
                    crop.as_ref(),
                    self.cfg.depth_m,
                    obs.confidence,
                );
                if assessment.attenuated {
                    stats.surface_attenuated += 1;
                }
                let dedup_group = crop.as_ref().map(|crop| self.dedup.assign(crop, &obs.bbox));

                let detection = Detection {
                    video_id: video_id.to_string(),
                    frame_index,
                    time_ms,
                    bbox: obs.bbox,
                    confidence: assessment.adjusted_confidence,
                    original_confidence: obs.confidence,
                    track_id: obs.track_id,
                    species: obs.species,
                    species_confidence: obs.species_confidence,
                    surface_probability: assessment.probability,
                    surface_attenuated: assessment.attenuated,
                    dedup_group,
                };
                let builder = builders.entry(obs.track_id).or_insert_with(|| TrackBuilder {
                    detections: Vec::new(),
                    first_frame: frame_index,
                    best: (obs.confidence, time_ms, obs.bbox),
                });
                if obs.confidence > builder.best.0 {
                    builder.best = (obs.confidence, time_ms, obs.bbox);
                }
                builder.detections.push(detection);
            }
        }

        let diagonal = frame_diagonal(meta.width, meta.height);
        let mut tracks: Vec<(TrackBuilder, crate::TrackSummary)> = builders
            .into_values()
            .map(|builder| {
                let summary = classify::summarize(
                    &builder.detections,
                    meta.fps,
                    diagonal,
                    &self.cfg.tracks,
                );
                (builder, summary)
            })
            .collect();
        // Surviving tracks first, then flagged ones, each group in order of
        // first appearance. Renumbering below keeps ids contiguous.
        tracks.sort_by_key(|(builder, summary)| (summary.false_positive, builder.first_frame));

        let mut finished = Vec::with_capacity(tracks.len());
        let mut next_id = next_track_index;
        for (mut builder, summary) in tracks {
            unify_track_species(&mut builder.detections);
            // The classifier only fills gaps the detection model left.
            let unlabeled = builder.detections.iter().all(|d| d.species.is_none());
            if !summary.false_positive && unlabeled {
                if let Some(classifier) = classifier.as_deref_mut() {
                    label_track(video_id, source, classifier, &mut builder)?;
                }
            }
            for detection in &mut builder.detections {
                detection.track_id = next_id;
            }
            stats.tracks_total += 1;
            if summary.false_positive {
                stats.tracks_false_positive += 1;
            }
            finished.push(Track {
                track_id: next_id,
                detections: builder.detections,
                summary,
            });
            next_id += 1;
        }

        let kept: Vec<Detection> = finished
            .iter()
            .filter(|track| !track.summary.false_positive)
            .flat_map(|track| track.detections.iter())
            .filter(|d| d.confidence >= self.cfg.confidence_threshold)
            .cloned()
            .collect();
        let maxn = maxn::compute_maxn(video_id, &kept);

        Ok(CleanseOutcome {
            video_id: video_id.to_string(),
            meta,
            window,
            tracks: finished,
            maxn,
            stats,
            next_track_index: next_id,
        })
    }
}

/// Cleanse one video from its annotation sidecar.
///
/// The external detector/tracker has already run and left
/// `<video>.detections.json` beside the file; its script plays back
/// through the pipeline. Frames are rendered synthetically from the
/// sidecar metadata; real pixel access plugs in through `FrameSource`.
pub fn process_annotated_video(
    video: &Path,
    video_id: &str,
    cfg: &PipelineConfig,
) -> Result<CleanseOutcome> {
    let sidecar = AnnotationSidecar::load(&AnnotationSidecar::path_for(video))?;
    let mut source = SyntheticSource::new(sidecar.meta);
    for &(start_ms, end_ms) in &sidecar.unstable_spans_ms {
        source = source.with_unstable_span(start_ms, end_ms);
    }
    let mut backend = ScriptedBackend::from_sidecar(&sidecar);
    let mut cleanser = Cleanser::new(cfg.clone());
    cleanser.cleanse(video_id, &mut source, &mut backend, None, 0)
}

/// Detection models flicker between class labels across frames; reporting
/// needs one species per track. The label with the highest summed
/// confidence wins and is applied to every detection of the track.
fn unify_track_species(detections: &mut [Detection]) {
    let mut totals: HashMap<String, f32> = HashMap::new();
    for d in detections.iter() {
        if let Some(species) = &d.species {
            *totals.entry(species.clone()).or_default() += d.species_confidence.unwrap_or(1.0);
        }
    }
    let Some((winner, _)) = totals
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return;
    };
    let confidence = detections
        .iter()
        .filter(|d| d.species.as_deref() == Some(winner.as_str()))
        .filter_map(|d| d.species_confidence)
        .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.max(c))));
    for d in detections.iter_mut() {
        d.species = Some(winner.clone());
        d.species_confidence = confidence;
    }
}

/// Label every detection of a track from its best crop.
fn label_track(
    video_id: &str,
    source: &mut dyn FrameSource,
    classifier: &mut dyn SpeciesClassifier,
    builder: &mut TrackBuilder,
) -> Result<()> {
    let (_, time_ms, bbox) = builder.best;
    let crop = match source.rgb_crop_at(time_ms, &bbox) {
        Ok(crop) => crop,
        Err(e) => {
            debug!("{video_id}: classifier crop unavailable at {time_ms} ms: {e:#}");
            return Ok(());
        }
    };
    let guess = classifier
        .classify(&crop)
        .with_context(|| format!("{video_id}: classifier {} failed", classifier.name()))?;
    if let Some((species, confidence)) = guess {
        for detection in &mut builder.detections {
            detection.species = Some(species.clone());
            detection.species_confidence = Some(confidence);
        }
    }
    Ok(())
}
