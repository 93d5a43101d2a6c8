//! Detection deduplication.
//!
//! BRUV detectors fire repeatedly on the same instant: interlaced frames,
//! chapter seams, near-identical consecutive crops. Each detection gets a
//! dedup group id: near-duplicates (perceptually similar crop AND nearly
//! unmoved box center) share a group, so downstream consumers can pick one
//! representative per group without losing rows.
//!
//! Matching is against a bounded recent-window cache rather than all prior
//! detections, keeping the pass near O(n). The cache is cleared between
//! videos; group ids are meaningless across videos.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::frame::{LumaFrame, RgbCrop};
use crate::BBox;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Maximum Hamming distance between dHashes to count as a duplicate.
    pub hamming_threshold: u32,
    /// Maximum bbox-center displacement in pixels to count as a duplicate.
    pub center_tolerance_px: f32,
    /// Recent-window cache size.
    pub cache_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: 8,
            center_tolerance_px: 2.0,
            cache_capacity: 256,
        }
    }
}

/// Difference hash (dHash) of a crop: 9x8 luma resample, one bit per
/// horizontal neighbor comparison.
pub fn dhash(luma: &LumaFrame) -> u64 {
    let grid = luma.resample(9, 8);
    let mut hash = 0u64;
    let mut bit = 0;
    for y in 0..8u32 {
        for x in 0..8u32 {
            if grid.pixel(x + 1, y) > grid.pixel(x, y) {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

struct CacheEntry {
    hash: u64,
    center: (f32, f32),
    group: u64,
}

/// Per-video deduplicator. Call `reset` between videos.
pub struct Deduplicator {
    cfg: DedupConfig,
    cache: VecDeque<CacheEntry>,
    next_group: u64,
}

impl Deduplicator {
    pub fn new(cfg: DedupConfig) -> Self {
        Self {
            cache: VecDeque::with_capacity(cfg.cache_capacity),
            cfg,
            next_group: 0,
        }
    }

    /// Clear cached hashes and restart group numbering.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.next_group = 0;
    }

    /// Assign a dedup group id to a detection, given its image crop.
    ///
    /// Deterministic over an ordered stream, so re-running a stream that
    /// was already grouped reproduces the same assignments.
    pub fn assign(&mut self, crop: &RgbCrop, bbox: &BBox) -> u64 {
        let hash = dhash(&crop.to_luma());
        let center = bbox.center();

        let matched = self.cache.iter().find(|entry| {
            hamming_distance(entry.hash, hash) <= self.cfg.hamming_threshold
                && center_delta(entry.center, center) <= self.cfg.center_tolerance_px
        });

        let group = match matched {
            Some(entry) => entry.group,
            None => {
                let group = self.next_group;
                self.next_group += 1;
                group
            }
        };

        if self.cache.len() >= self.cfg.cache_capacity.max(1) {
            self.cache.pop_front();
        }
        self.cache.push_back(CacheEntry {
            hash,
            center,
            group,
        });
        group
    }
}

fn center_delta(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop_with_pattern(offset: u8) -> RgbCrop {
        let mut pixels = Vec::with_capacity(32 * 32 * 3);
        for y in 0..32u32 {
            for x in 0..32u32 {
                // Horizontal gradient gives the dHash structure.
                let v = ((x * 8) as u8).wrapping_add(offset).wrapping_add((y % 3) as u8);
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        RgbCrop {
            width: 32,
            height: 32,
            pixels,
        }
    }

    fn inverted_crop() -> RgbCrop {
        let mut pixels = Vec::with_capacity(32 * 32 * 3);
        for _y in 0..32u32 {
            for x in 0..32u32 {
                let v = 255 - (x * 8) as u8;
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        RgbCrop {
            width: 32,
            height: 32,
            pixels,
        }
    }

    #[test]
    fn identical_detections_share_a_group() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let crop = crop_with_pattern(0);
        let bbox = BBox::new(10.0, 10.0, 42.0, 42.0);
        let g1 = dedup.assign(&crop, &bbox);
        let g2 = dedup.assign(&crop, &bbox);
        assert_eq!(g1, g2);
    }

    #[test]
    fn similar_crop_with_tiny_shift_is_a_duplicate() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let g1 = dedup.assign(&crop_with_pattern(0), &BBox::new(10.0, 10.0, 42.0, 42.0));
        // 1px displacement, near-identical content.
        let g2 = dedup.assign(&crop_with_pattern(1), &BBox::new(11.0, 10.0, 43.0, 42.0));
        assert_eq!(g1, g2);
    }

    #[test]
    fn displaced_center_starts_a_new_group() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let crop = crop_with_pattern(0);
        let g1 = dedup.assign(&crop, &BBox::new(10.0, 10.0, 42.0, 42.0));
        // Same content, but the box moved well past tolerance.
        let g2 = dedup.assign(&crop, &BBox::new(60.0, 10.0, 92.0, 42.0));
        assert_ne!(g1, g2);
    }

    #[test]
    fn crops_smaller_than_the_hash_grid_are_handled() {
        // Distant animals produce boxes below the 9x8 hash grid.
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let tiny = RgbCrop {
            width: 5,
            height: 5,
            pixels: vec![120; 5 * 5 * 3],
        };
        let bbox = BBox::new(100.0, 100.0, 105.0, 105.0);
        let g1 = dedup.assign(&tiny, &bbox);
        let g2 = dedup.assign(&tiny, &bbox);
        assert_eq!(g1, g2);
    }

    #[test]
    fn different_content_starts_a_new_group() {
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let bbox = BBox::new(10.0, 10.0, 42.0, 42.0);
        let g1 = dedup.assign(&crop_with_pattern(0), &bbox);
        let g2 = dedup.assign(&inverted_crop(), &bbox);
        assert_ne!(g1, g2);
    }

    #[test]
    fn rerunning_a_stream_reproduces_assignments() {
        let stream: Vec<(RgbCrop, BBox)> = vec![
            (crop_with_pattern(0), BBox::new(10.0, 10.0, 42.0, 42.0)),
            (crop_with_pattern(1), BBox::new(11.0, 10.0, 43.0, 42.0)),
            (inverted_crop(), BBox::new(10.0, 10.0, 42.0, 42.0)),
            (crop_with_pattern(0), BBox::new(10.0, 10.0, 42.0, 42.0)),
        ];
        let run = |dedup: &mut Deduplicator| -> Vec<u64> {
            stream
                .iter()
                .map(|(crop, bbox)| dedup.assign(crop, bbox))
                .collect()
        };
        let mut dedup = Deduplicator::new(DedupConfig::default());
        let first = run(&mut dedup);
        dedup.reset();
        let second = run(&mut dedup);
        assert_eq!(first, second);
    }

    #[test]
    fn cache_stays_bounded() {
        let cfg = DedupConfig {
            cache_capacity: 4,
            ..DedupConfig::default()
        };
        let mut dedup = Deduplicator::new(cfg);
        for i in 0..100u32 {
            let bbox = BBox::new(i as f32 * 50.0, 0.0, i as f32 * 50.0 + 32.0, 32.0);
            dedup.assign(&crop_with_pattern((i % 17) as u8), &bbox);
        }
        assert!(dedup.cache.len() <= 4);
    }
}
