//! Batch orchestration: discovery, worker processes, resume, chapter
//! stitching and the consolidated report.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use bruv_pipeline::batch::{self, BatchOptions};
use bruv_pipeline::detect::{AnnotationSidecar, RawDetection};
use bruv_pipeline::storage::{PipelineStore, SqliteStore};
use bruv_pipeline::{BBox, BatchConfig, PipelineConfig, VideoMeta};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn write_video_with_sidecar(path: &Path, species: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"").unwrap();

    let mut sidecar = AnnotationSidecar {
        meta: VideoMeta {
            duration_ms: 10_000,
            fps: 2.0,
            width: 320,
            height: 240,
        },
        detections: Default::default(),
        unstable_spans_ms: Vec::new(),
    };
    for frame in 0..20u64 {
        sidecar.detections.entry(frame).or_default().push(RawDetection {
            bbox: BBox::new(10.0 + frame as f32 * 12.0, 120.0, 40.0 + frame as f32 * 12.0, 160.0),
            confidence: 0.9,
            track_id: 1,
            species: Some(species.to_string()),
            species_confidence: Some(0.8),
        });
    }
    sidecar.save(&AnnotationSidecar::path_for(path)).unwrap();
}

fn options(input: &Path, output: &Path) -> BatchOptions {
    BatchOptions {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        plan_only: false,
    }
}

#[test]
fn batch_processes_resumes_and_stitches_chapters() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("BRUV_WORKER_BIN", env!("CARGO_BIN_EXE_bruv_worker"));

    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    // Two chapters of one GoPro deployment, one standalone video, and one
    // video the detector never annotated.
    write_video_with_sidecar(&input.path().join("dive1/GX010042.MP4"), "sphyrna_lewini");
    write_video_with_sidecar(&input.path().join("dive1/GX020042.MP4"), "sphyrna_lewini");
    write_video_with_sidecar(&input.path().join("bait_cam.mp4"), "galeocerdo_cuvier");
    std::fs::write(input.path().join("broken.mp4"), b"").unwrap();

    let pipeline_cfg = PipelineConfig::default();
    let mut batch_cfg = BatchConfig::default();
    batch_cfg.workers = Some(2);

    let opts = options(input.path(), output.path());
    let stop = Arc::new(AtomicBool::new(false));
    let summary = batch::run(&opts, &pipeline_cfg, &batch_cfg, Arc::clone(&stop)).unwrap();

    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);
    assert!(!summary.interrupted);

    // Consolidated results hold per-chapter and stitched deployment MaxN.
    let mut store = SqliteStore::open(&output.path().join("results.db")).unwrap();
    let report = store.maxn_report().unwrap();
    let deployment = report
        .iter()
        .find(|r| r.video_id == "dive1/deployment_0042")
        .expect("stitched deployment record");
    assert_eq!(deployment.species, "sphyrna_lewini");
    assert_eq!(deployment.count, 1);
    assert!(report.iter().any(|r| r.video_id == "bait_cam.mp4"));
    assert!(report.iter().any(|r| r.video_id == "dive1/GX010042.MP4"));

    // The run report enumerates every job with its status and reason.
    let raw = std::fs::read_to_string(output.path().join("summary.json")).unwrap();
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let jobs = report["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 4);
    let broken = jobs
        .iter()
        .find(|j| j["video_path"] == "broken.mp4")
        .expect("failed job row");
    assert_eq!(broken["status"], "failed");
    assert!(broken["error"].as_str().is_some());
    assert!(report["summary"]["elapsed_s"].as_f64().unwrap() >= 0.0);

    // Second run: the succeeded videos are skipped, only the broken one
    // is retried and fails again.
    let summary = batch::run(&opts, &pipeline_cfg, &batch_cfg, Arc::clone(&stop)).unwrap();
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed, 1);

    // Annotate the broken video; the next run completes the batch.
    write_video_with_sidecar(&input.path().join("broken.mp4"), "galeocerdo_cuvier");
    let summary = batch::run(&opts, &pipeline_cfg, &batch_cfg, stop).unwrap();
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    std::env::remove_var("BRUV_WORKER_BIN");
}

#[test]
fn plan_mode_runs_no_workers() {
    let _guard = ENV_LOCK.lock().unwrap();
    // Deliberately no worker binary: plan mode must not need one.
    std::env::set_var("BRUV_WORKER_BIN", "/nonexistent/bruv_worker");

    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_video_with_sidecar(&input.path().join("bait_cam.mp4"), "galeocerdo_cuvier");

    let mut opts = options(input.path(), output.path());
    opts.plan_only = true;
    let stop = Arc::new(AtomicBool::new(false));
    let summary =
        batch::run(&opts, &PipelineConfig::default(), &BatchConfig::default(), stop).unwrap();

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.attempted, 0);
    assert!(!output.path().join("results.db").exists());
    assert!(!output.path().join("summary.json").exists());

    std::env::remove_var("BRUV_WORKER_BIN");
}

#[test]
fn interrupted_run_leaves_resumable_state() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("BRUV_WORKER_BIN", env!("CARGO_BIN_EXE_bruv_worker"));

    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for i in 0..4 {
        write_video_with_sidecar(
            &input.path().join(format!("cam{i}.mp4")),
            "galeocerdo_cuvier",
        );
    }

    // Stop flag already set: workers exit before taking any job.
    let stop = Arc::new(AtomicBool::new(true));
    let opts = options(input.path(), output.path());
    let pipeline_cfg = PipelineConfig::default();
    let batch_cfg = BatchConfig::default();
    let summary = batch::run(&opts, &pipeline_cfg, &batch_cfg, stop).unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.succeeded, 0);
    // No worker ever pulled a job, so nothing counts as attempted.
    assert_eq!(summary.attempted, 0);

    // A fresh run picks the whole queue back up.
    let stop = Arc::new(AtomicBool::new(false));
    let summary = batch::run(&opts, &pipeline_cfg, &batch_cfg, stop).unwrap();
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 0);

    std::env::remove_var("BRUV_WORKER_BIN");
}
