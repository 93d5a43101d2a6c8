//! bruv_worker - processes exactly one video in an isolated process.
//!
//! Spawned by `bruv_batch` so a decoder or model crash kills only this
//! process; the orchestrator records the failure and moves on. Exit code
//! zero means the per-video database was written completely.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use bruv_pipeline::cleanse::process_annotated_video;
use bruv_pipeline::storage::{PipelineStore, SqliteStore};
use bruv_pipeline::PipelineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the video file.
    #[arg(long)]
    video: PathBuf,
    /// Identifier recorded in every output row.
    #[arg(long)]
    video_id: String,
    /// Per-video result database to write.
    #[arg(long)]
    db: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (cfg, _) = PipelineConfig::load()?;
    let outcome = process_annotated_video(&args.video, &args.video_id, &cfg)?;
    log::info!(
        "{}: {} track(s) ({} flagged), {} detection row(s), window {}..{} ms",
        args.video_id,
        outcome.stats.tracks_total,
        outcome.stats.tracks_false_positive,
        outcome
            .tracks
            .iter()
            .map(|t| t.detections.len())
            .sum::<usize>(),
        outcome.window.start_ms,
        outcome.window.end_ms,
    );

    let mut store = SqliteStore::open(&args.db)?;
    store.save_outcome(&outcome)?;
    Ok(())
}
