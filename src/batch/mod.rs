//! Batch orchestration.
//!
//! Fans the per-video pipeline out over a directory tree: discovery,
//! worker sizing from cores and memory, one OS process per video so a
//! decoder crash cannot take down the run, a resumable SQLite job ledger,
//! and a final consolidation pass that merges worker databases, stitches
//! GoPro chapters and writes the MaxN report.

mod discover;
mod resources;
mod runner;

pub use discover::{discover_videos, VideoJob};
pub use resources::{plan_workers, size_workers, WorkerPlan};
pub use runner::{run, BatchOptions, BatchSummary};
