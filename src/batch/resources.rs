//! Worker sizing from host resources.

use log::warn;

use crate::config::BatchConfig;

/// Sized worker pool plus the inputs that produced it, for logging and
/// plan-mode output.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPlan {
    pub workers: usize,
    pub cores: usize,
    pub available_memory_gb: Option<f64>,
}

/// Pure sizing rule: the minimum of usable cores, memory slots and the
/// configured cap, never below one. An explicit `workers` request joins
/// the same minimum; it can shrink the pool but never push it past what
/// the host can hold.
pub fn size_workers(cores: usize, available_memory_gb: Option<f64>, cfg: &BatchConfig) -> usize {
    let mut limit = cores.saturating_sub(cfg.reserved_cores).max(1);
    if let Some(gb) = available_memory_gb {
        let by_memory = (gb / cfg.memory_per_worker_gb).floor() as usize;
        limit = limit.min(by_memory.max(1));
    }
    let limit = limit.min(cfg.requested_cap).max(1);
    match cfg.workers {
        Some(requested) => requested.clamp(1, limit),
        None => limit,
    }
}

pub fn plan_workers(cfg: &BatchConfig) -> WorkerPlan {
    let cores = num_cpus::get();
    let available_memory_gb = available_memory_gb();
    if available_memory_gb.is_none() {
        warn!("available memory unknown, sizing workers from cores alone");
    }
    WorkerPlan {
        workers: size_workers(cores, available_memory_gb, cfg),
        cores,
        available_memory_gb,
    }
}

/// `MemAvailable` from /proc/meminfo, in GiB. `None` off Linux or when
/// the field is missing.
fn available_memory_gb() -> Option<f64> {
    let raw = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: f64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb / (1024.0 * 1024.0));
        }
    }
    None
}
