//! bruv_video - cleanse a single annotated video and print its MaxN.
//!
//! Operator-facing counterpart of the batch pipeline, for spot checks and
//! for reprocessing one deployment video after threshold changes.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use bruv_pipeline::cleanse::process_annotated_video;
use bruv_pipeline::storage::{PipelineStore, SqliteStore};
use bruv_pipeline::PipelineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the video file (expects `<video>.detections.json` beside it).
    #[arg(long)]
    video: PathBuf,
    /// Identifier recorded in the output rows. Defaults to the file name.
    #[arg(long)]
    video_id: Option<String>,
    /// Result database. Defaults to `<video>.results.db`.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Include unlabeled (placeholder-species) records in the printout.
    #[arg(long)]
    show_unclassified: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let video_id = args.video_id.clone().unwrap_or_else(|| {
        args.video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.video.to_string_lossy().into_owned())
    });
    let db_path = args.db.clone().unwrap_or_else(|| {
        let mut name = args.video.as_os_str().to_os_string();
        name.push(".results.db");
        PathBuf::from(name)
    });

    let (cfg, _) = PipelineConfig::load()?;
    let outcome = process_annotated_video(&args.video, &video_id, &cfg)?;

    println!(
        "{video_id}: stable window {:.1}s..{:.1}s{}",
        outcome.window.start_ms as f64 / 1000.0,
        outcome.window.end_ms as f64 / 1000.0,
        if outcome.window.is_fallback {
            " (fallback)"
        } else {
            ""
        }
    );
    println!(
        "tracks: {} total, {} flagged as false positives",
        outcome.stats.tracks_total, outcome.stats.tracks_false_positive
    );
    for record in &outcome.maxn {
        if !record.is_reportable() && !args.show_unclassified {
            continue;
        }
        println!(
            "maxn {:<30} {:>3} at frame {} ({:.1}s), tracks {:?}",
            record.species,
            record.count,
            record.frame_index,
            record.time_ms as f64 / 1000.0,
            record.track_ids,
        );
    }

    let mut store = SqliteStore::open(&db_path)?;
    store.save_outcome(&outcome)?;
    log::info!("results written to {}", db_path.display());
    Ok(())
}
