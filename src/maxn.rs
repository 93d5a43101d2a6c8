//! MaxN aggregation.
//!
//! MaxN is the standard BRUV abundance metric: the maximum number of
//! individuals of one species visible simultaneously in a single frame.
//! Counting distinct track ids per frame (rather than detections) keeps a
//! single animal that triggers several boxes from inflating the count.
//!
//! Multi-chapter deployments (GoPro splits long recordings into chapter
//! files) are first normalized onto one continuous timeline so MaxN
//! reflects the whole deployment, not each fragment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Detection, UNCLASSIFIED_SPECIES};

/// Per (video, species) abundance record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaxNRecord {
    pub video_id: String,
    pub species: String,
    /// Maximum simultaneous distinct-track count.
    pub count: u32,
    /// Frame achieving the maximum. Ties keep the earliest frame.
    pub frame_index: u64,
    pub time_ms: u64,
    /// Tracks contributing to the maximum, sorted.
    pub track_ids: Vec<u64>,
}

impl MaxNRecord {
    /// Placeholder-bucket records are excluded from final reporting.
    pub fn is_reportable(&self) -> bool {
        self.species != UNCLASSIFIED_SPECIES
    }
}

/// Compute MaxN per species from cleaned, true-positive detections of one
/// video (or one normalized deployment timeline).
///
/// The input must already exclude false-positive tracks; unlabeled
/// detections accumulate under [`UNCLASSIFIED_SPECIES`].
pub fn compute_maxn(video_id: &str, detections: &[Detection]) -> Vec<MaxNRecord> {
    // frame -> species -> distinct track ids. BTreeMap keeps frames in
    // ascending order, so strictly-greater replacement leaves the
    // earliest frame in place on ties.
    let mut frames: BTreeMap<u64, (u64, HashMap<String, BTreeSet<u64>>)> = BTreeMap::new();
    for d in detections {
        let entry = frames.entry(d.frame_index).or_insert_with(|| (d.time_ms, HashMap::new()));
        entry.0 = entry.0.min(d.time_ms);
        entry
            .1
            .entry(d.species_bucket().to_string())
            .or_default()
            .insert(d.track_id);
    }

    let mut best: BTreeMap<String, MaxNRecord> = BTreeMap::new();
    for (frame_index, (time_ms, species_tracks)) in frames {
        for (species, tracks) in species_tracks {
            let count = tracks.len() as u32;
            let replace = match best.get(&species) {
                Some(record) => count > record.count,
                None => true,
            };
            if replace {
                best.insert(
                    species.clone(),
                    MaxNRecord {
                        video_id: video_id.to_string(),
                        species,
                        count,
                        frame_index,
                        time_ms,
                        track_ids: tracks.into_iter().collect(),
                    },
                );
            }
        }
    }
    best.into_values().collect()
}

// ----------------------------------------------------------------------------
// Chapter grouping
// ----------------------------------------------------------------------------

/// Parsed GoPro-style chapter stem: `GX010012` is chapter 01 of
/// deployment 0012.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterKey {
    pub deployment: String,
    pub chapter: u32,
}

/// Parse a GoPro chapter stem (`GX`/`GH`/`GP` + 2-digit chapter + 4-digit
/// file number). Non-chapter names return `None` and are treated as
/// standalone deployments.
pub fn parse_chapter_stem(stem: &str) -> Option<ChapterKey> {
    static CHAPTER_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = CHAPTER_RE
        .get_or_init(|| Regex::new(r"(?i)^G[XHP](\d{2})(\d{4})$").expect("chapter regex"));
    let caps = re.captures(stem)?;
    let chapter: u32 = caps[1].parse().ok()?;
    Some(ChapterKey {
        deployment: caps[2].to_string(),
        chapter,
    })
}

/// One chapter's extent within a deployment.
#[derive(Clone, Debug)]
pub struct ChapterSpan {
    pub video_id: String,
    pub frame_count: u64,
    pub duration_ms: u64,
}

/// Merge per-chapter detections onto one continuous deployment timeline.
///
/// Chapters must be supplied in playback order. Frame indices and
/// timestamps are offset by the cumulative extent of preceding chapters;
/// track ids are re-based per chapter so distinct animals in different
/// chapters can never collide.
pub fn normalize_deployment(chapters: Vec<(ChapterSpan, Vec<Detection>)>) -> Vec<Detection> {
    let mut out = Vec::new();
    let mut frame_offset = 0u64;
    let mut time_offset = 0u64;
    let mut next_track_base = 0u64;
    for (span, detections) in chapters {
        let mut remap: HashMap<u64, u64> = HashMap::new();
        let mut used = 0u64;
        for d in detections {
            let mapped = *remap.entry(d.track_id).or_insert_with(|| {
                let id = next_track_base + used;
                used += 1;
                id
            });
            let mut d = d;
            d.frame_index += frame_offset;
            d.time_ms += time_offset;
            d.track_id = mapped;
            out.push(d);
        }
        next_track_base += used;
        frame_offset += span.frame_count;
        time_offset += span.duration_ms;
    }
    out
}
