//! SQLite persistence for cleansed detections, MaxN and the batch ledger.
//!
//! Each worker writes one database per video; the orchestrator merges them
//! into a run-level database at consolidation. The ledger is a separate
//! database owned exclusively by the orchestrator so a crashed worker can
//! never corrupt resume state.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cleanse::CleanseOutcome;
use crate::classify::FalsePositiveReason;
use crate::maxn::MaxNRecord;
use crate::{BBox, Detection};

fn now_s() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| anyhow!("system clock is before the unix epoch"))?
        .as_secs())
}

// -------------------- Detection store --------------------

pub trait PipelineStore {
    /// Persist everything from one cleansed video. Replaces any previous
    /// rows for the same video id, so retried jobs stay idempotent.
    fn save_outcome(&mut self, outcome: &CleanseOutcome) -> Result<()>;

    fn load_detections(&mut self, video_id: &str) -> Result<Vec<Detection>>;

    fn save_maxn(&mut self, records: &[MaxNRecord]) -> Result<()>;

    /// All MaxN records with a real species label, ordered for reporting.
    fn maxn_report(&mut self) -> Result<Vec<MaxNRecord>>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS videos (
              video_id TEXT PRIMARY KEY,
              duration_ms INTEGER NOT NULL,
              fps REAL NOT NULL,
              width INTEGER NOT NULL,
              height INTEGER NOT NULL,
              window_start_ms INTEGER NOT NULL,
              window_end_ms INTEGER NOT NULL,
              window_fallback INTEGER NOT NULL,
              stats_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              video_id TEXT NOT NULL,
              frame_index INTEGER NOT NULL,
              time_ms INTEGER NOT NULL,
              xmin REAL NOT NULL,
              ymin REAL NOT NULL,
              xmax REAL NOT NULL,
              ymax REAL NOT NULL,
              confidence REAL NOT NULL,
              original_confidence REAL NOT NULL,
              track_id INTEGER NOT NULL,
              species TEXT,
              species_confidence REAL,
              surface_probability REAL NOT NULL,
              surface_attenuated INTEGER NOT NULL,
              dedup_group INTEGER
            );

            CREATE TABLE IF NOT EXISTS tracks (
              video_id TEXT NOT NULL,
              track_id INTEGER NOT NULL,
              frame_count INTEGER NOT NULL,
              duration_s REAL NOT NULL,
              displacement_ratio REAL NOT NULL,
              mean_confidence REAL NOT NULL,
              peak_confidence REAL NOT NULL,
              false_positive INTEGER NOT NULL,
              fp_reason TEXT,
              PRIMARY KEY (video_id, track_id)
            );

            CREATE TABLE IF NOT EXISTS maxn (
              video_id TEXT NOT NULL,
              species TEXT NOT NULL,
              count INTEGER NOT NULL,
              frame_index INTEGER NOT NULL,
              time_ms INTEGER NOT NULL,
              track_ids_json TEXT NOT NULL,
              PRIMARY KEY (video_id, species)
            );

            CREATE INDEX IF NOT EXISTS idx_detections_video
              ON detections(video_id, frame_index);
            "#,
        )?;
        Ok(())
    }

    /// Pull every table of another store into this one. Used by the
    /// orchestrator to consolidate per-video worker databases.
    pub fn merge_from(&mut self, other_path: &Path) -> Result<()> {
        let path = other_path
            .to_str()
            .ok_or_else(|| anyhow!("database path is not valid utf-8: {}", other_path.display()))?;
        self.conn
            .execute("ATTACH DATABASE ?1 AS src", params![path])?;
        let merge = self.conn.execute_batch(
            r#"
            INSERT OR REPLACE INTO videos SELECT * FROM src.videos;
            DELETE FROM detections
              WHERE video_id IN (SELECT video_id FROM src.videos);
            INSERT INTO detections(
              video_id, frame_index, time_ms, xmin, ymin, xmax, ymax,
              confidence, original_confidence, track_id, species,
              species_confidence, surface_probability, surface_attenuated,
              dedup_group)
            SELECT video_id, frame_index, time_ms, xmin, ymin, xmax, ymax,
              confidence, original_confidence, track_id, species,
              species_confidence, surface_probability, surface_attenuated,
              dedup_group
            FROM src.detections;
            INSERT OR REPLACE INTO tracks SELECT * FROM src.tracks;
            INSERT OR REPLACE INTO maxn SELECT * FROM src.maxn;
            "#,
        );
        // Detach even when the merge fails so the connection stays usable.
        let detach = self.conn.execute_batch("DETACH DATABASE src");
        merge?;
        detach?;
        Ok(())
    }

    /// Probed metadata for one stored video, if present.
    pub fn load_meta(&mut self, video_id: &str) -> Result<Option<crate::frame::VideoMeta>> {
        let mut stmt = self.conn.prepare(
            "SELECT duration_ms, fps, width, height FROM videos WHERE video_id = ?1",
        )?;
        let mut rows = stmt.query(params![video_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(crate::frame::VideoMeta {
            duration_ms: row.get::<_, i64>(0)? as u64,
            fps: row.get(1)?,
            width: row.get(2)?,
            height: row.get(3)?,
        }))
    }

    fn delete_video(&mut self, video_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM videos WHERE video_id = ?1", params![video_id])?;
        self.conn.execute(
            "DELETE FROM detections WHERE video_id = ?1",
            params![video_id],
        )?;
        self.conn
            .execute("DELETE FROM tracks WHERE video_id = ?1", params![video_id])?;
        self.conn
            .execute("DELETE FROM maxn WHERE video_id = ?1", params![video_id])?;
        Ok(())
    }
}

fn fp_reason_str(reason: FalsePositiveReason) -> &'static str {
    match reason {
        FalsePositiveReason::ShortDuration => "short_duration",
        FalsePositiveReason::StaticLowConfidence => "static_low_confidence",
    }
}

impl PipelineStore for SqliteStore {
    fn save_outcome(&mut self, outcome: &CleanseOutcome) -> Result<()> {
        self.delete_video(&outcome.video_id)?;
        let tx = self.conn.transaction()?;

        let stats_json = serde_json::to_string(&outcome.stats)?;
        tx.execute(
            r#"
            INSERT INTO videos(video_id, duration_ms, fps, width, height,
              window_start_ms, window_end_ms, window_fallback, stats_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                outcome.video_id,
                outcome.meta.duration_ms as i64,
                outcome.meta.fps,
                outcome.meta.width,
                outcome.meta.height,
                outcome.window.start_ms as i64,
                outcome.window.end_ms as i64,
                outcome.window.is_fallback as i64,
                stats_json,
            ],
        )?;

        for track in &outcome.tracks {
            tx.execute(
                r#"
                INSERT INTO tracks(video_id, track_id, frame_count, duration_s,
                  displacement_ratio, mean_confidence, peak_confidence,
                  false_positive, fp_reason)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    outcome.video_id,
                    track.track_id as i64,
                    track.summary.frame_count as i64,
                    track.summary.duration_s,
                    track.summary.displacement_ratio,
                    track.summary.mean_confidence,
                    track.summary.peak_confidence,
                    track.summary.false_positive as i64,
                    track.summary.fp_reason.map(fp_reason_str),
                ],
            )?;
            for d in &track.detections {
                tx.execute(
                    r#"
                    INSERT INTO detections(video_id, frame_index, time_ms,
                      xmin, ymin, xmax, ymax, confidence, original_confidence,
                      track_id, species, species_confidence,
                      surface_probability, surface_attenuated, dedup_group)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                    "#,
                    params![
                        d.video_id,
                        d.frame_index as i64,
                        d.time_ms as i64,
                        d.bbox.xmin,
                        d.bbox.ymin,
                        d.bbox.xmax,
                        d.bbox.ymax,
                        d.confidence,
                        d.original_confidence,
                        d.track_id as i64,
                        d.species,
                        d.species_confidence,
                        d.surface_probability,
                        d.surface_attenuated as i64,
                        d.dedup_group.map(|g| g as i64),
                    ],
                )?;
            }
        }

        for record in &outcome.maxn {
            insert_maxn(&tx, record)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_detections(&mut self, video_id: &str) -> Result<Vec<Detection>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT video_id, frame_index, time_ms, xmin, ymin, xmax, ymax,
              confidence, original_confidence, track_id, species,
              species_confidence, surface_probability, surface_attenuated,
              dedup_group
            FROM detections WHERE video_id = ?1
            ORDER BY frame_index, track_id
            "#,
        )?;
        let mut rows = stmt.query(params![video_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(detection_from_row(row)?);
        }
        Ok(out)
    }

    fn save_maxn(&mut self, records: &[MaxNRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for record in records {
            insert_maxn(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn maxn_report(&mut self) -> Result<Vec<MaxNRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT video_id, species, count, frame_index, time_ms, track_ids_json
            FROM maxn ORDER BY video_id, species
            "#,
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let track_ids_json: String = row.get(5)?;
            let record = MaxNRecord {
                video_id: row.get(0)?,
                species: row.get(1)?,
                count: row.get::<_, i64>(2)? as u32,
                frame_index: row.get::<_, i64>(3)? as u64,
                time_ms: row.get::<_, i64>(4)? as u64,
                track_ids: serde_json::from_str(&track_ids_json)?,
            };
            if record.is_reportable() {
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl SqliteStore {
    /// Detections of surviving tracks at or above the confidence floor,
    /// in frame order. Input to deployment stitching.
    pub fn load_surviving_detections(
        &mut self,
        video_id: &str,
        min_confidence: f32,
    ) -> Result<Vec<Detection>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT d.video_id, d.frame_index, d.time_ms, d.xmin, d.ymin,
              d.xmax, d.ymax, d.confidence, d.original_confidence, d.track_id,
              d.species, d.species_confidence, d.surface_probability,
              d.surface_attenuated, d.dedup_group
            FROM detections d
            JOIN tracks t ON t.video_id = d.video_id AND t.track_id = d.track_id
            WHERE d.video_id = ?1 AND t.false_positive = 0 AND d.confidence >= ?2
            ORDER BY d.frame_index, d.track_id
            "#,
        )?;
        let mut rows = stmt.query(params![video_id, min_confidence])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(detection_from_row(row)?);
        }
        Ok(out)
    }
}

fn detection_from_row(row: &rusqlite::Row<'_>) -> Result<Detection> {
    Ok(Detection {
        video_id: row.get(0)?,
        frame_index: row.get::<_, i64>(1)? as u64,
        time_ms: row.get::<_, i64>(2)? as u64,
        bbox: BBox::new(row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?),
        confidence: row.get(7)?,
        original_confidence: row.get(8)?,
        track_id: row.get::<_, i64>(9)? as u64,
        species: row.get(10)?,
        species_confidence: row.get(11)?,
        surface_probability: row.get(12)?,
        surface_attenuated: row.get::<_, i64>(13)? != 0,
        dedup_group: row.get::<_, Option<i64>>(14)?.map(|g| g as u64),
    })
}

fn insert_maxn(conn: &Connection, record: &MaxNRecord) -> Result<()> {
    let track_ids_json = serde_json::to_string(&record.track_ids)?;
    conn.execute(
        r#"
        INSERT OR REPLACE INTO maxn(video_id, species, count, frame_index,
          time_ms, track_ids_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            record.video_id,
            record.species,
            record.count as i64,
            record.frame_index as i64,
            record.time_ms as i64,
            track_ids_json,
        ],
    )?;
    Ok(())
}

// -------------------- Batch job ledger --------------------

/// Lifecycle of one video job within a batch run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow!("unknown job status in ledger: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub video_path: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub updated_at_s: u64,
    pub error: Option<String>,
}

/// Resume state for a batch run. Only the orchestrator thread writes it.
pub trait JobLedger {
    /// Register a discovered video, preserving any existing status. New
    /// videos start queued.
    fn register(&mut self, job_id: &str, video_path: &str) -> Result<()>;

    fn mark(&mut self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<()>;

    fn load(&mut self) -> Result<Vec<JobRecord>>;
}

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut ledger = Self { conn };
        ledger.ensure_schema()?;
        Ok(ledger)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS jobs (
              job_id TEXT PRIMARY KEY,
              video_path TEXT NOT NULL,
              status TEXT NOT NULL,
              attempts INTEGER NOT NULL DEFAULT 0,
              updated_at INTEGER NOT NULL,
              error TEXT
            );
            "#,
        )?;
        Ok(())
    }
}

impl JobLedger for SqliteLedger {
    fn register(&mut self, job_id: &str, video_path: &str) -> Result<()> {
        let now = now_s()? as i64;
        self.conn.execute(
            r#"
            INSERT INTO jobs(job_id, video_path, status, attempts, updated_at)
            VALUES (?1, ?2, 'queued', 0, ?3)
            ON CONFLICT(job_id) DO UPDATE SET video_path = excluded.video_path
            "#,
            params![job_id, video_path, now],
        )?;
        Ok(())
    }

    fn mark(&mut self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<()> {
        let now = now_s()? as i64;
        let attempts_bump = matches!(status, JobStatus::Running) as i64;
        let changed = self.conn.execute(
            r#"
            UPDATE jobs
            SET status = ?2, error = ?3, updated_at = ?4, attempts = attempts + ?5
            WHERE job_id = ?1
            "#,
            params![job_id, status.as_str(), error, now, attempts_bump],
        )?;
        if changed == 0 {
            return Err(anyhow!("job {job_id} is not registered in the ledger"));
        }
        Ok(())
    }

    fn load(&mut self) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, video_path, status, attempts, updated_at, error
             FROM jobs ORDER BY video_path",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let status_raw: String = row.get(2)?;
            out.push(JobRecord {
                job_id: row.get(0)?,
                video_path: row.get(1)?,
                status: JobStatus::parse(&status_raw)?,
                attempts: row.get::<_, i64>(3)? as u32,
                updated_at_s: row.get::<_, i64>(4)? as u64,
                error: row.get(5)?,
            });
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    jobs: Vec<JobRecord>,
}

impl JobLedger for InMemoryLedger {
    fn register(&mut self, job_id: &str, video_path: &str) -> Result<()> {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.job_id == job_id) {
            job.video_path = video_path.to_string();
            return Ok(());
        }
        self.jobs.push(JobRecord {
            job_id: job_id.to_string(),
            video_path: video_path.to_string(),
            status: JobStatus::Queued,
            attempts: 0,
            updated_at_s: now_s()?,
            error: None,
        });
        Ok(())
    }

    fn mark(&mut self, job_id: &str, status: JobStatus, error: Option<&str>) -> Result<()> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| anyhow!("job {job_id} is not registered in the ledger"))?;
        if status == JobStatus::Running {
            job.attempts += 1;
        }
        job.status = status;
        job.error = error.map(str::to_string);
        job.updated_at_s = now_s()?;
        Ok(())
    }

    fn load(&mut self) -> Result<Vec<JobRecord>> {
        let mut jobs = self.jobs.clone();
        jobs.sort_by(|a, b| a.video_path.cmp(&b.video_path));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanse::CleanseStats;
    use crate::frame::VideoMeta;
    use crate::stability::StabilityWindow;
    use crate::{classify::TrackSummary, Track};

    fn sample_outcome(video_id: &str) -> CleanseOutcome {
        let detection = Detection {
            video_id: video_id.to_string(),
            frame_index: 10,
            time_ms: 400,
            bbox: BBox::new(1.0, 2.0, 3.0, 4.0),
            confidence: 0.8,
            original_confidence: 0.9,
            track_id: 0,
            species: Some("sphyrna_lewini".to_string()),
            species_confidence: Some(0.7),
            surface_probability: 0.1,
            surface_attenuated: false,
            dedup_group: Some(3),
        };
        let summary = TrackSummary {
            frame_count: 1,
            duration_s: 2.0,
            displacement_ratio: 0.5,
            mean_confidence: 0.8,
            peak_confidence: 0.9,
            false_positive: false,
            fp_reason: None,
        };
        CleanseOutcome {
            video_id: video_id.to_string(),
            meta: VideoMeta {
                duration_ms: 60_000,
                fps: 25.0,
                width: 1920,
                height: 1080,
            },
            window: StabilityWindow {
                start_ms: 6_000,
                end_ms: 54_000,
                is_fallback: false,
            },
            tracks: vec![Track {
                track_id: 0,
                detections: vec![detection],
                summary,
            }],
            maxn: vec![MaxNRecord {
                video_id: video_id.to_string(),
                species: "sphyrna_lewini".to_string(),
                count: 1,
                frame_index: 10,
                time_ms: 400,
                track_ids: vec![0],
            }],
            stats: CleanseStats::default(),
            next_track_index: 1,
        }
    }

    #[test]
    fn outcome_round_trips_through_sqlite() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut store = SqliteStore::open(file.path()).unwrap();
        store.save_outcome(&sample_outcome("v1")).unwrap();

        let detections = store.load_detections("v1").unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].species.as_deref(), Some("sphyrna_lewini"));
        assert_eq!(detections[0].dedup_group, Some(3));

        let report = store.maxn_report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].count, 1);
    }

    #[test]
    fn saving_twice_replaces_rather_than_duplicates() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut store = SqliteStore::open(file.path()).unwrap();
        store.save_outcome(&sample_outcome("v1")).unwrap();
        store.save_outcome(&sample_outcome("v1")).unwrap();
        assert_eq!(store.load_detections("v1").unwrap().len(), 1);
    }

    #[test]
    fn merge_pulls_worker_databases_together() {
        let worker_a = tempfile::NamedTempFile::new().unwrap();
        let worker_b = tempfile::NamedTempFile::new().unwrap();
        {
            let mut store = SqliteStore::open(worker_a.path()).unwrap();
            store.save_outcome(&sample_outcome("a")).unwrap();
        }
        {
            let mut store = SqliteStore::open(worker_b.path()).unwrap();
            store.save_outcome(&sample_outcome("b")).unwrap();
        }

        let merged = tempfile::NamedTempFile::new().unwrap();
        let mut store = SqliteStore::open(merged.path()).unwrap();
        store.merge_from(worker_a.path()).unwrap();
        store.merge_from(worker_b.path()).unwrap();

        assert_eq!(store.load_detections("a").unwrap().len(), 1);
        assert_eq!(store.load_detections("b").unwrap().len(), 1);
        assert_eq!(store.maxn_report().unwrap().len(), 2);
    }

    #[test]
    fn ledger_tracks_attempts_and_errors() {
        let mut ledger = InMemoryLedger::default();
        ledger.register("job1", "dive/GX010001.MP4").unwrap();
        ledger.mark("job1", JobStatus::Running, None).unwrap();
        ledger
            .mark("job1", JobStatus::Failed, Some("decoder error"))
            .unwrap();
        ledger.mark("job1", JobStatus::Running, None).unwrap();
        ledger.mark("job1", JobStatus::Succeeded, None).unwrap();

        let jobs = ledger.load().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Succeeded);
        assert_eq!(jobs[0].attempts, 2);
        assert!(jobs[0].error.is_none());
    }

    #[test]
    fn sqlite_ledger_survives_reopen() {
        let file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut ledger = SqliteLedger::open(file.path()).unwrap();
            ledger.register("job1", "dive/GX010001.MP4").unwrap();
            ledger.mark("job1", JobStatus::Running, None).unwrap();
            ledger.mark("job1", JobStatus::Succeeded, None).unwrap();
            ledger.register("job2", "dive/GX010002.MP4").unwrap();
        }

        let mut ledger = SqliteLedger::open(file.path()).unwrap();
        let jobs = ledger.load().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].status, JobStatus::Succeeded);
        assert_eq!(jobs[1].status, JobStatus::Queued);
        assert!(jobs[0].attempts >= 1);
    }

    #[test]
    fn marking_an_unknown_job_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut ledger = SqliteLedger::open(file.path()).unwrap();
        assert!(ledger.mark("ghost", JobStatus::Running, None).is_err());
    }
}
