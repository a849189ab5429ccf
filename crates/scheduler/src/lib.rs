//! Tick-driven job scheduler.
//!
//! A [`Timer`] keeps jobs in a min-heap keyed by the tick at which each one
//! next needs attention. A dedicated thread advances the tick counter at a
//! fixed period and pops whatever is due; the [`Runner`] then feeds those
//! triggers into a bounded [`WorkerPool`], coalescing overlapping runs of
//! singleton jobs.

pub mod error;
pub mod job;
pub mod manifest;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod runner;
pub mod schedule;
pub mod state;
pub mod timer;

pub use error::{PoolError, Result, SchedulerError};
pub use job::{Control, Job, JobCallback, JobOptions, JobResult};
pub use metrics::TimerMetrics;
pub use pool::WorkerPool;
pub use queue::PriorityQueue;
pub use runner::{Runner, RunnerStats, Submission};
pub use schedule::{Advance, Schedule, ScheduleSpec};
pub use state::{ErrorDirectory, ErrorRecord, JobState, JobStats, JobStatus, TimerStatus};
pub use timer::{default_timer, init_default, Timer};

pub use cadence_core::{TimerConfig, TracedError};
