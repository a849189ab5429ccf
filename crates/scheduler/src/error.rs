use thiserror::Error;

use cadence_core::ConfigError;

/// Errors returned synchronously by the scheduler API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron pattern '{pattern}': {source}")]
    InvalidCron {
        pattern: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("cron pattern '{0}' has no upcoming occurrence")]
    CronExhausted(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("schedule group must contain at least one schedule")]
    EmptyGroup,

    #[error("job '{0}' has no callback")]
    MissingCallback(String),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("timer is closed")]
    Closed,

    #[error("default timer already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Submission failures reported by [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool at capacity ({capacity} in flight)")]
    Full { capacity: usize },

    #[error("pool is closed")]
    Closed,
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
