//! Batch run loop and consolidation.

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use crate::batch::discover::{discover_videos, VideoJob};
use crate::batch::resources::plan_workers;
use crate::config::{BatchConfig, PipelineConfig};
use crate::maxn::{self, ChapterKey, ChapterSpan, MaxNRecord};
use crate::storage::{JobLedger, JobRecord, JobStatus, PipelineStore, SqliteLedger, SqliteStore};

pub struct BatchOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Discover, size and report without processing anything.
    pub plan_only: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchSummary {
    pub discovered: usize,
    /// Jobs skipped because a previous run already succeeded.
    pub skipped: usize,
    /// Jobs actually handed to a worker this run.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub elapsed_s: f64,
}

#[derive(Serialize)]
struct RunReport<'a> {
    summary: &'a BatchSummary,
    /// Per-video status and failure reasons, straight from the ledger.
    jobs: &'a [JobRecord],
    maxn: &'a [MaxNRecord],
}

enum WorkerEvent {
    Started(String),
    Finished(String, Result<(), String>),
}

/// Run a whole batch: discover, resume, fan out, consolidate.
///
/// `stop` is checked between jobs; once set, queued work is left for the
/// next run and in-flight jobs finish normally. The ledger is written only
/// from this thread.
pub fn run(
    opts: &BatchOptions,
    pipeline_cfg: &PipelineConfig,
    batch_cfg: &BatchConfig,
    stop: Arc<AtomicBool>,
) -> Result<BatchSummary> {
    let started = std::time::Instant::now();
    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("creating output directory {}", opts.output_dir.display()))?;
    let videos_dir = opts.output_dir.join("videos");
    std::fs::create_dir_all(&videos_dir)?;

    let mut ledger = SqliteLedger::open(&opts.output_dir.join("ledger.db"))?;
    let jobs = discover_videos(&opts.input_dir, batch_cfg)?;
    for job in &jobs {
        ledger.register(&job.job_id, &job.video_id())?;
    }

    // Resume: anything the ledger already records as succeeded stays done.
    let done: Vec<String> = ledger
        .load()?
        .into_iter()
        .filter(|j| j.status == JobStatus::Succeeded)
        .map(|j| j.job_id)
        .collect();
    let (skipped, to_run): (Vec<VideoJob>, Vec<VideoJob>) = jobs
        .into_iter()
        .partition(|job| done.contains(&job.job_id));

    let mut summary = BatchSummary {
        discovered: skipped.len() + to_run.len(),
        skipped: skipped.len(),
        ..BatchSummary::default()
    };

    let plan = plan_workers(batch_cfg);
    info!(
        "batch: {} video(s) discovered, {} already done, {} to process on {} worker(s) \
         ({} core(s), {} memory)",
        summary.discovered,
        summary.skipped,
        to_run.len(),
        plan.workers,
        plan.cores,
        plan.available_memory_gb
            .map(|gb| format!("{gb:.1} GiB free"))
            .unwrap_or_else(|| "unknown".to_string()),
    );
    if opts.plan_only {
        for job in &to_run {
            info!("plan: would process {}", job.video_id());
        }
        summary.elapsed_s = started.elapsed().as_secs_f64();
        return Ok(summary);
    }

    let bar = ProgressBar::new(to_run.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} {msg}",
    )?);

    let worker_bin = worker_binary()?;
    let queue: Arc<Mutex<VecDeque<VideoJob>>> = Arc::new(Mutex::new(to_run.into_iter().collect()));
    let (tx, rx) = mpsc::channel::<WorkerEvent>();

    let mut handles = Vec::new();
    for _ in 0..plan.workers {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let stop = Arc::clone(&stop);
        let worker_bin = worker_bin.clone();
        let videos_dir = videos_dir.clone();
        handles.push(thread::spawn(move || {
            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let job = match queue.lock() {
                    Ok(mut queue) => queue.pop_front(),
                    Err(_) => break,
                };
                let Some(job) = job else { break };
                let job_id = job.job_id.clone();
                if tx.send(WorkerEvent::Started(job_id.clone())).is_err() {
                    break;
                }
                let result = run_worker(&worker_bin, &job, &videos_dir);
                let result = result.map_err(|e| format!("{e:#}"));
                if tx.send(WorkerEvent::Finished(job_id, result)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut failures: Vec<String> = Vec::new();
    for event in rx {
        match event {
            WorkerEvent::Started(job_id) => {
                ledger.mark(&job_id, JobStatus::Running, None)?;
                summary.attempted += 1;
            }
            WorkerEvent::Finished(job_id, result) => {
                match result {
                    Ok(()) => {
                        ledger.mark(&job_id, JobStatus::Succeeded, None)?;
                        summary.succeeded += 1;
                    }
                    Err(error) => {
                        warn!("job {job_id} failed: {error}");
                        ledger.mark(&job_id, JobStatus::Failed, Some(&error))?;
                        summary.failed += 1;
                        failures.push(job_id);
                    }
                }
                bar.inc(1);
            }
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            return Err(anyhow!("a worker thread panicked"));
        }
    }
    bar.finish_and_clear();
    summary.interrupted = stop.load(Ordering::SeqCst);
    summary.elapsed_s = started.elapsed().as_secs_f64();

    consolidate(opts, pipeline_cfg, &mut ledger, &summary)?;
    Ok(summary)
}

fn run_worker(worker_bin: &Path, job: &VideoJob, videos_dir: &Path) -> Result<()> {
    let db_path = videos_dir.join(format!("{}.db", job.job_id));
    let status = Command::new(worker_bin)
        .arg("--video")
        .arg(&job.path)
        .arg("--video-id")
        .arg(job.video_id())
        .arg("--db")
        .arg(&db_path)
        .stdout(Stdio::null())
        .status()
        .with_context(|| format!("spawning worker {}", worker_bin.display()))?;
    if !status.success() {
        return Err(anyhow!(
            "worker exited with {} for {}",
            status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            job.video_id()
        ));
    }
    Ok(())
}

/// Worker binary next to the current executable, overridable for tests
/// and packaging layouts.
fn worker_binary() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("BRUV_WORKER_BIN") {
        return Ok(PathBuf::from(path));
    }
    let exe = std::env::current_exe().context("locating current executable")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow!("executable has no parent directory"))?;
    Ok(dir.join("bruv_worker"))
}

/// Merge succeeded worker databases, stitch GoPro chapters into
/// deployments and write the run report.
fn consolidate(
    opts: &BatchOptions,
    pipeline_cfg: &PipelineConfig,
    ledger: &mut SqliteLedger,
    summary: &BatchSummary,
) -> Result<()> {
    let mut store = SqliteStore::open(&opts.output_dir.join("results.db"))?;
    let jobs: Vec<JobRecord> = ledger.load()?;
    let succeeded: Vec<(String, String)> = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Succeeded)
        .map(|j| (j.job_id.clone(), j.video_path.clone()))
        .collect();
    for (job_id, _) in &succeeded {
        let db_path = opts.output_dir.join("videos").join(format!("{job_id}.db"));
        if db_path.exists() {
            store
                .merge_from(&db_path)
                .with_context(|| format!("merging worker database {}", db_path.display()))?;
        }
    }

    if pipeline_cfg.group_chapters {
        let video_ids: Vec<String> = succeeded.into_iter().map(|(_, path)| path).collect();
        stitch_deployments(&mut store, pipeline_cfg, &video_ids)?;
    }

    let report = store.maxn_report()?;
    let report_path = opts.output_dir.join("summary.json");
    let raw = serde_json::to_string_pretty(&RunReport {
        summary,
        jobs: &jobs,
        maxn: &report,
    })?;
    std::fs::write(&report_path, raw)
        .with_context(|| format!("writing run report {}", report_path.display()))?;
    info!(
        "consolidated: {} reportable MaxN record(s), report at {}",
        report.len(),
        report_path.display()
    );
    Ok(())
}

/// Group chapter videos of one deployment, rebuild their detections on a
/// continuous timeline and add deployment-level MaxN records.
fn stitch_deployments(
    store: &mut SqliteStore,
    pipeline_cfg: &PipelineConfig,
    video_ids: &[String],
) -> Result<()> {
    // (parent dir, deployment number) -> chapters, ordered by chapter.
    let mut groups: BTreeMap<(String, String), BTreeMap<u32, String>> = BTreeMap::new();
    for video_id in video_ids {
        let path = Path::new(video_id);
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        let Some(ChapterKey {
            deployment,
            chapter,
        }) = maxn::parse_chapter_stem(stem)
        else {
            continue;
        };
        let parent = path
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        groups
            .entry((parent, deployment))
            .or_default()
            .insert(chapter, video_id.clone());
    }

    for ((parent, deployment), chapters) in groups {
        if chapters.len() < 2 {
            continue;
        }
        let mut stitched = Vec::new();
        for video_id in chapters.values() {
            let Some(meta) = store.load_meta(video_id)? else {
                warn!("deployment {deployment}: no stored metadata for {video_id}, skipping group");
                stitched.clear();
                break;
            };
            let detections = store.load_surviving_detections(
                video_id,
                pipeline_cfg.confidence_threshold,
            )?;
            let span = ChapterSpan {
                video_id: video_id.clone(),
                frame_count: meta.frame_count(),
                duration_ms: meta.duration_ms,
            };
            stitched.push((span, detections));
        }
        if stitched.is_empty() {
            continue;
        }
        let deployment_id = if parent.is_empty() {
            format!("deployment_{deployment}")
        } else {
            format!("{parent}/deployment_{deployment}")
        };
        let timeline = maxn::normalize_deployment(stitched);
        let records = maxn::compute_maxn(&deployment_id, &timeline);
        info!(
            "stitched {} chapter(s) into {deployment_id} ({} MaxN record(s))",
            chapters.len(),
            records.len()
        );
        store.save_maxn(&records)?;
    }
    Ok(())
}
