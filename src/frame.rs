//! Frame access seam.
//!
//! Video decoding and container handling live outside this crate. The
//! pipeline only needs three things from a decoded video: its metadata,
//! a grayscale frame near a timestamp (for motion analysis), and an RGB
//! crop of a detection (for surface scoring, dedup hashing and species
//! classification). `FrameSource` is that seam.
//!
//! `SyntheticSource` is the in-tree implementation used by tests and
//! `stub://` paths: it renders deterministic pixel patterns with
//! configurable unstable time spans, so stability and pipeline behavior
//! can be exercised without decoding real video.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::BBox;

/// Decoded-video metadata the pipeline depends on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub duration_ms: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoMeta {
    pub fn frame_count(&self) -> u64 {
        ((self.duration_ms as f64 / 1000.0) * self.fps).round() as u64
    }
}

/// Single-channel (luma) frame.
#[derive(Clone, Debug)]
pub struct LumaFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major, `width * height` bytes.
    pub pixels: Vec<u8>,
}

impl LumaFrame {
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Box-average resample to exactly `target_w` x `target_h`. Motion
    /// analysis runs on small frames (320x180) regardless of source
    /// resolution, and hashing needs a fixed grid even from crops smaller
    /// than the grid, so sources below the target are upsampled too.
    pub fn resample(&self, target_w: u32, target_h: u32) -> LumaFrame {
        if target_w == self.width && target_h == self.height {
            return self.clone();
        }
        let mut pixels = Vec::with_capacity((target_w * target_h) as usize);
        for ty in 0..target_h {
            let y0 = (ty as u64 * self.height as u64 / target_h as u64) as u32;
            let y1 = (((ty + 1) as u64 * self.height as u64 / target_h as u64) as u32)
                .max(y0 + 1)
                .min(self.height);
            for tx in 0..target_w {
                let x0 = (tx as u64 * self.width as u64 / target_w as u64) as u32;
                let x1 = (((tx + 1) as u64 * self.width as u64 / target_w as u64) as u32)
                    .max(x0 + 1)
                    .min(self.width);
                let mut sum = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += self.pixel(x, y) as u64;
                    }
                }
                let count = ((y1 - y0) * (x1 - x0)) as u64;
                pixels.push((sum / count) as u8);
            }
        }
        LumaFrame {
            width: target_w,
            height: target_h,
            pixels,
        }
    }
}

/// Interleaved RGB crop of one detection.
#[derive(Clone, Debug)]
pub struct RgbCrop {
    pub width: u32,
    pub height: u32,
    /// Row-major, `width * height * 3` bytes (R, G, B).
    pub pixels: Vec<u8>,
}

impl RgbCrop {
    pub fn channel(&self, x: u32, y: u32, c: usize) -> u8 {
        self.pixels[((y * self.width + x) * 3) as usize + c]
    }

    /// Luma approximation of the crop, for hashing and texture analysis.
    pub fn to_luma(&self) -> LumaFrame {
        let mut pixels = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let r = self.channel(x, y, 0) as u32;
                let g = self.channel(x, y, 1) as u32;
                let b = self.channel(x, y, 2) as u32;
                // BT.601 integer approximation.
                pixels.push(((77 * r + 150 * g + 29 * b) >> 8) as u8);
            }
        }
        LumaFrame {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// Frame accessor for one video.
///
/// Implementations sit on top of an external decoder. Seeking is
/// timestamp-based because BRUV recordings routinely have variable frame
/// rates after transcoding; callers must not assume frame-exact seeks.
pub trait FrameSource {
    fn meta(&self) -> Result<VideoMeta>;

    /// Grayscale frame at (or nearest to) `time_ms`.
    fn luma_frame_at(&mut self, time_ms: u64) -> Result<LumaFrame>;

    /// RGB crop of `bbox` in the frame at `time_ms`. The bbox is clamped
    /// to frame bounds; an empty intersection is an error.
    fn rgb_crop_at(&mut self, time_ms: u64, bbox: &BBox) -> Result<RgbCrop>;
}

// ----------------------------------------------------------------------------
// Synthetic source (stub:// and tests)
// ----------------------------------------------------------------------------

/// Deterministic synthetic video: flat scene with a small noise floor,
/// plus configured unstable spans where the whole frame scrambles every
/// millisecond (simulating deployment/retrieval camera motion).
pub struct SyntheticSource {
    meta: VideoMeta,
    unstable_spans_ms: Vec<(u64, u64)>,
    seed: u64,
}

impl SyntheticSource {
    pub fn new(meta: VideoMeta) -> Self {
        Self {
            meta,
            unstable_spans_ms: Vec::new(),
            seed: 0x5eed,
        }
    }

    /// Mark `[start_ms, end_ms)` as unstable (high inter-frame motion).
    pub fn with_unstable_span(mut self, start_ms: u64, end_ms: u64) -> Self {
        self.unstable_spans_ms.push((start_ms, end_ms));
        self
    }

    fn is_unstable(&self, time_ms: u64) -> bool {
        self.unstable_spans_ms
            .iter()
            .any(|&(start, end)| time_ms >= start && time_ms < end)
    }

    fn render_luma(&self, time_ms: u64) -> LumaFrame {
        let w = self.meta.width;
        let h = self.meta.height;
        let mut pixels = vec![128u8; (w * h) as usize];
        if self.is_unstable(time_ms) {
            // Scramble from the timestamp so consecutive samples differ.
            let mut rng = StdRng::seed_from_u64(self.seed ^ time_ms);
            rng.fill(&mut pixels[..]);
        } else {
            // Stable scene: tiny noise floor, below the change threshold.
            let mut rng = StdRng::seed_from_u64(self.seed ^ time_ms);
            for p in pixels.iter_mut() {
                *p = 128u8.wrapping_add(rng.gen_range(0..3));
            }
        }
        LumaFrame {
            width: w,
            height: h,
            pixels,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn meta(&self) -> Result<VideoMeta> {
        Ok(self.meta)
    }

    fn luma_frame_at(&mut self, time_ms: u64) -> Result<LumaFrame> {
        if time_ms > self.meta.duration_ms {
            return Err(anyhow!(
                "seek past end of video ({} > {} ms)",
                time_ms,
                self.meta.duration_ms
            ));
        }
        Ok(self.render_luma(time_ms))
    }

    fn rgb_crop_at(&mut self, time_ms: u64, bbox: &BBox) -> Result<RgbCrop> {
        let xmin = bbox.xmin.max(0.0) as u32;
        let ymin = bbox.ymin.max(0.0) as u32;
        let xmax = (bbox.xmax.min(self.meta.width as f32)) as u32;
        let ymax = (bbox.ymax.min(self.meta.height as f32)) as u32;
        if xmax <= xmin || ymax <= ymin {
            return Err(anyhow!("bbox does not intersect frame"));
        }
        let luma = self.luma_frame_at(time_ms)?;
        let w = xmax - xmin;
        let h = ymax - ymin;
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in ymin..ymax {
            for x in xmin..xmax {
                let v = luma.pixel(x, y);
                // Bluish underwater cast.
                pixels.push(v / 2);
                pixels.push(v);
                pixels.push(v.saturating_add(40));
            }
        }
        Ok(RgbCrop {
            width: w,
            height: h,
            pixels,
        })
    }
}
