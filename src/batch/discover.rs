//! Video discovery.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BatchConfig;

/// One discovered video. The job id is derived from the path relative to
/// the input root, so moving the whole survey directory does not
/// invalidate an existing ledger.
#[derive(Clone, Debug)]
pub struct VideoJob {
    pub job_id: String,
    pub path: PathBuf,
    pub relative: PathBuf,
}

impl VideoJob {
    /// Stable video identifier used across the ledger and result tables.
    pub fn video_id(&self) -> String {
        self.relative.to_string_lossy().replace('\\', "/")
    }
}

/// Recursively collect video files under `root`, sorted by relative path.
/// Hidden files and directories are skipped.
pub fn discover_videos(root: &Path, cfg: &BatchConfig) -> Result<Vec<VideoJob>> {
    let mut paths = Vec::new();
    walk(root, cfg, &mut paths)?;
    paths.sort();
    Ok(paths
        .into_iter()
        .map(|path| {
            let relative = path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            VideoJob {
                job_id: job_id(&relative),
                path,
                relative,
            }
        })
        .collect())
}

fn walk(dir: &Path, cfg: &BatchConfig, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading directory {}", dir.display()))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            walk(&path, cfg, out)?;
        } else if cfg.matches_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn job_id(relative: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}
