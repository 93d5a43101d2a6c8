//! bruv_batch - orchestrate the pipeline over a directory of videos.
//!
//! Discovers videos recursively, sizes a worker pool from cores and free
//! memory, runs one `bruv_worker` process per video, and consolidates the
//! per-video databases into one results database plus a JSON report.
//! Re-running with the same output directory resumes: succeeded videos
//! are never reprocessed.
//!
//! The exit code is the number of failed jobs (clamped), so survey scripts
//! can retry until it reaches zero.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bruv_pipeline::batch::{self, BatchOptions};
use bruv_pipeline::PipelineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory tree containing the survey videos.
    #[arg(long)]
    input: PathBuf,
    /// Output directory for the ledger, result databases and report.
    #[arg(long)]
    output: PathBuf,
    /// Discover and size the run, then exit without processing.
    #[arg(long)]
    plan: bool,
    /// Override the sized worker count.
    #[arg(long, env = "BRUV_WORKERS")]
    workers: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(failed) => ExitCode::from(failed.min(u8::MAX as usize) as u8),
        Err(e) => {
            log::error!("batch failed: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<usize> {
    let args = Args::parse();
    let (pipeline_cfg, mut batch_cfg) = PipelineConfig::load()?;
    if let Some(workers) = args.workers {
        batch_cfg.workers = Some(workers);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, finishing in-flight jobs");
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let opts = BatchOptions {
        input_dir: args.input,
        output_dir: args.output,
        plan_only: args.plan,
    };
    let summary = batch::run(&opts, &pipeline_cfg, &batch_cfg, stop)?;
    log::info!(
        "batch done: {} discovered, {} skipped, {} succeeded, {} failed{}",
        summary.discovered,
        summary.skipped,
        summary.succeeded,
        summary.failed,
        if summary.interrupted {
            " (interrupted)"
        } else {
            ""
        }
    );
    Ok(summary.failed)
}
