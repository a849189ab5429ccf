use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for a cadence process: timer tuning plus the jobs
/// the `cadence-worker` binary registers at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Tick width, pool sizing and cron re-check bound.
    #[serde(default)]
    pub timer: TimerConfig,

    /// Jobs to register, in file order.
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

// ── Timer ───────────────────────────────────────────────────────────

/// Timer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Width of one tick in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of pool threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,

    /// Maximum callbacks admitted to the pool at once (running + waiting).
    /// 0 = unlimited.
    #[serde(default)]
    pub max_in_flight: usize,

    /// Longest a cron entry may wait in the timer queue before it is
    /// re-examined against the wall clock.
    #[serde(default = "default_cron_recheck_ms")]
    pub cron_recheck_ms: u64,
}

fn default_interval_ms() -> u64 {
    100
}

fn default_cron_recheck_ms() -> u64 {
    1000
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            worker_threads: 0,
            max_in_flight: 0,
            cron_recheck_ms: default_cron_recheck_ms(),
        }
    }
}

impl TimerConfig {
    /// Config with the given tick width and everything else defaulted.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis().max(1) as u64,
            ..Self::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Resolve the pool thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Pool admission capacity, `None` when unlimited.
    pub fn capacity(&self) -> Option<usize> {
        (self.max_in_flight > 0).then_some(self.max_in_flight)
    }

    /// Cron re-check bound expressed in ticks, never below one.
    pub fn cron_recheck_ticks(&self) -> i64 {
        let interval = self.interval_ms.max(1);
        ((self.cron_recheck_ms / interval) as i64).max(1)
    }
}

// ── Jobs ────────────────────────────────────────────────────────────

/// A job declared in the manifest. Exactly one of `every` / `cron` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry {
    /// Unique job name, used in logs and stats.
    pub name: String,

    /// Fixed interval, e.g. "30s", "5m", "1h30m".
    pub every: Option<String>,

    /// Cron expression, 5 fields (minute resolution) or 6/7 fields.
    pub cron: Option<String>,

    /// Program to execute on every run.
    pub command: String,

    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Coalesce overlapping triggers into at most one follow-up run.
    #[serde(default)]
    pub singleton: bool,

    /// Total run budget. Absent = unlimited.
    pub times: Option<u64>,

    /// Register the job stopped; it keeps its schedule but does not run.
    #[serde(default)]
    pub paused: bool,
}

impl JobEntry {
    /// Parsed `every` duration, if present and well-formed.
    pub fn every_duration(&self) -> Option<Duration> {
        self.every.as_deref().and_then(super::parse_duration)
    }
}
