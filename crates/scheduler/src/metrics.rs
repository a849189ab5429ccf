use serde::Serialize;

use crate::state::TimerStatus;

/// Point-in-time view of a timer, its runner and its pool.
#[derive(Debug, Clone, Serialize)]
pub struct TimerMetrics {
    /// Ticks elapsed since the timer was created.
    pub ticks: i64,
    pub status: TimerStatus,
    /// Jobs held by the timer queue (closed jobs linger until next popped).
    pub queued_jobs: usize,
    /// Jobs waiting in the runner FIFO for a pool slot.
    pub pending_dispatch: usize,
    pub pool_threads: usize,
    pub pool_running: usize,
    pub pool_waiting: usize,
    /// `None` when the pool admits without limit.
    pub pool_capacity: Option<usize>,
    pub dispatched: u64,
    pub coalesced: u64,
    pub rejected: u64,
    pub worker_panics: u64,
}

impl TimerMetrics {
    /// Share of worker threads busy with a callback (0.0 - 1.0).
    pub fn worker_utilization(&self) -> f64 {
        if self.pool_threads == 0 {
            return 0.0;
        }
        (self.pool_running as f64 / self.pool_threads as f64).min(1.0)
    }
}
