//! Per-job run state: lifecycle status, counters, timestamps and error history.
//!
//! Everything except the error directory is atomic; readers never block the
//! pool workers that update it.

mod errors;
mod status;

use std::sync::atomic::{fence, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

pub use errors::{ErrorDirectory, ErrorRecord, MAX_DISTINCT_ERRORS};
pub use status::{AtomicEnum, JobStatus, StatusCell, TimerStatus};

/// `remaining_runs` value meaning "no limit".
pub const UNLIMITED_RUNS: i64 = -1;

const NEVER: i64 = i64::MIN;

/// Outcome of asking for permission to run once more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunClaim {
    /// Run allowed. `last` is true when this claim used up the budget.
    Granted { last: bool },
    /// Budget already spent; the run must not happen.
    Exhausted,
}

/// Shared state of one job.
#[derive(Debug)]
pub struct JobState {
    status: StatusCell<JobStatus>,
    singleton: bool,
    pending: AtomicI32,
    running: AtomicI32,
    executing: AtomicI32,
    runs: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    remaining: AtomicI64,
    last_start: AtomicI64,
    last_over: AtomicI64,
    last_success: AtomicI64,
    last_failed: AtomicI64,
    completed: AtomicU64,
    runtime_nanos: AtomicU64,
    errors: ErrorDirectory,
}

impl JobState {
    pub fn new(singleton: bool, times: Option<u64>, status: JobStatus) -> Self {
        Self {
            status: StatusCell::new(status),
            singleton,
            pending: AtomicI32::new(0),
            running: AtomicI32::new(0),
            executing: AtomicI32::new(0),
            runs: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            remaining: AtomicI64::new(times_to_raw(times)),
            last_start: AtomicI64::new(NEVER),
            last_over: AtomicI64::new(NEVER),
            last_success: AtomicI64::new(NEVER),
            last_failed: AtomicI64::new(NEVER),
            completed: AtomicU64::new(0),
            runtime_nanos: AtomicU64::new(0),
            errors: ErrorDirectory::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status.load()
    }

    pub(crate) fn status_cell(&self) -> &StatusCell<JobStatus> {
        &self.status
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn errors(&self) -> &ErrorDirectory {
        &self.errors
    }

    // ── Run budget ──────────────────────────────────────────────────

    /// Take one run from the budget. Once the budget reaches zero every
    /// further claim is refused; it is never replenished by the scheduler.
    pub fn claim_run(&self) -> RunClaim {
        let claimed = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                UNLIMITED_RUNS => Some(UNLIMITED_RUNS),
                n if n > 0 => Some(n - 1),
                _ => None,
            });
        match claimed {
            Ok(UNLIMITED_RUNS) => RunClaim::Granted { last: false },
            Ok(previous) => RunClaim::Granted { last: previous == 1 },
            Err(_) => RunClaim::Exhausted,
        }
    }

    /// Replace the remaining run budget. `None` removes the limit.
    pub fn set_times(&self, times: Option<u64>) {
        self.remaining.store(times_to_raw(times), Ordering::Release);
    }

    /// Lower the budget to at most `max` runs. Never raises it.
    pub(crate) fn cap_remaining(&self, max: u64) {
        let max = times_to_raw(Some(max));
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n == UNLIMITED_RUNS || n > max).then_some(max)
            });
    }

    /// Runs left, `None` when unlimited.
    pub fn remaining_runs(&self) -> Option<u64> {
        match self.remaining.load(Ordering::Acquire) {
            UNLIMITED_RUNS => None,
            n => Some(n.max(0) as u64),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_runs() == Some(0)
    }

    // ── Dispatch counters (driven by the runner) ────────────────────

    pub fn pending(&self) -> i32 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn running(&self) -> i32 {
        self.running.load(Ordering::Acquire)
    }

    /// Adjust the pending counter, returning the new value.
    pub(crate) fn add_pending(&self, delta: i32) -> i32 {
        let next = self.pending.fetch_add(delta, Ordering::AcqRel) + delta;
        debug_assert!(next >= 0, "pending count went negative");
        next
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.store(0, Ordering::Release);
    }

    /// Adjust the running counter, returning the new value.
    pub(crate) fn add_running(&self, delta: i32) -> i32 {
        let next = self.running.fetch_add(delta, Ordering::AcqRel) + delta;
        debug_assert!(next >= 0, "running count went negative");
        debug_assert!(!self.singleton || next <= 1, "singleton running twice");
        next
    }

    // ── Execution bookkeeping ───────────────────────────────────────

    /// Callbacks currently executing, whoever invoked them.
    pub fn executing(&self) -> i32 {
        self.executing.load(Ordering::SeqCst)
    }

    /// Enter a callback. Moves `Ready` to `Running`.
    pub(crate) fn enter_exec(&self) {
        self.executing.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        self.status.transition(JobStatus::Ready, JobStatus::Running);
    }

    /// Leave a callback. The last one out moves `Running` back to `Ready`;
    /// if another callback entered meanwhile, `Running` is restored.
    pub(crate) fn leave_exec(&self) {
        if self.executing.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        self.status.transition(JobStatus::Running, JobStatus::Ready);
        fence(Ordering::SeqCst);
        if self.executing() > 0 {
            self.status.transition(JobStatus::Ready, JobStatus::Running);
        }
    }

    pub(crate) fn mark_start(&self, at: DateTime<Utc>) {
        self.runs.fetch_add(1, Ordering::AcqRel);
        self.last_start.store(at.timestamp_millis(), Ordering::Release);
    }

    pub(crate) fn add_success(&self, at: DateTime<Utc>) {
        self.successes.fetch_add(1, Ordering::AcqRel);
        self.last_success.store(at.timestamp_millis(), Ordering::Release);
    }

    pub(crate) fn add_failure(&self, at: DateTime<Utc>) {
        self.failures.fetch_add(1, Ordering::AcqRel);
        self.last_failed.store(at.timestamp_millis(), Ordering::Release);
    }

    pub(crate) fn mark_over(&self, at: DateTime<Utc>, elapsed: Duration) {
        self.last_over.store(at.timestamp_millis(), Ordering::Release);
        self.completed.fetch_add(1, Ordering::AcqRel);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.runtime_nanos.fetch_add(nanos, Ordering::AcqRel);
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Mean callback duration over completed runs.
    pub fn avg_duration(&self) -> Duration {
        let completed = self.completed.load(Ordering::Acquire);
        if completed == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.runtime_nanos.load(Ordering::Acquire) / completed)
    }

    /// Point-in-time copy for dashboards and tests.
    pub fn snapshot(&self) -> JobStats {
        JobStats {
            status: self.status(),
            singleton: self.singleton,
            pending: self.pending(),
            running: self.running(),
            runs: self.runs(),
            successes: self.successes(),
            failures: self.failures(),
            remaining_runs: self.remaining_runs(),
            last_start: load_time(&self.last_start),
            last_over: load_time(&self.last_over),
            last_success: load_time(&self.last_success),
            last_failed: load_time(&self.last_failed),
            avg_duration: self.avg_duration(),
            errors: self.errors.entries(),
        }
    }
}

/// Serializable snapshot of a [`JobState`].
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub status: JobStatus,
    pub singleton: bool,
    pub pending: i32,
    pub running: i32,
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    /// `None` when the job has no run limit.
    pub remaining_runs: Option<u64>,
    pub last_start: Option<DateTime<Utc>>,
    pub last_over: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failed: Option<DateTime<Utc>>,
    pub avg_duration: Duration,
    /// Distinct errors, most recently seen first.
    pub errors: Vec<ErrorRecord>,
}

fn times_to_raw(times: Option<u64>) -> i64 {
    match times {
        Some(n) => i64::try_from(n).unwrap_or(i64::MAX),
        None => UNLIMITED_RUNS,
    }
}

fn load_time(cell: &AtomicI64) -> Option<DateTime<Utc>> {
    match cell.load(Ordering::Acquire) {
        NEVER => None,
        millis => Utc.timestamp_millis_opt(millis).single(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_exhausts() {
        let state = JobState::new(false, None, JobStatus::Ready);
        for _ in 0..100 {
            assert_eq!(state.claim_run(), RunClaim::Granted { last: false });
        }
        assert_eq!(state.remaining_runs(), None);
    }

    #[test]
    fn limited_budget_counts_down_and_stays_at_zero() {
        let state = JobState::new(false, Some(3), JobStatus::Ready);
        assert_eq!(state.claim_run(), RunClaim::Granted { last: false });
        assert_eq!(state.claim_run(), RunClaim::Granted { last: false });
        assert_eq!(state.claim_run(), RunClaim::Granted { last: true });
        for _ in 0..10 {
            assert_eq!(state.claim_run(), RunClaim::Exhausted);
        }
        assert_eq!(state.remaining_runs(), Some(0));
        assert!(state.is_exhausted());
    }

    #[test]
    fn concurrent_claims_never_exceed_budget() {
        let state = std::sync::Arc::new(JobState::new(false, Some(500), JobStatus::Ready));
        let granted = std::sync::Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let granted = granted.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let RunClaim::Granted { .. } = state.claim_run() {
                            granted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(granted.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn set_times_replaces_budget() {
        let state = JobState::new(false, Some(1), JobStatus::Ready);
        state.set_times(Some(5));
        assert_eq!(state.remaining_runs(), Some(5));
        state.set_times(None);
        assert_eq!(state.remaining_runs(), None);
    }

    #[test]
    fn cap_remaining_only_lowers() {
        let state = JobState::new(false, None, JobStatus::Ready);
        state.cap_remaining(1);
        assert_eq!(state.remaining_runs(), Some(1));
        state.cap_remaining(4);
        assert_eq!(state.remaining_runs(), Some(1));

        let limited = JobState::new(false, Some(0), JobStatus::Ready);
        limited.cap_remaining(1);
        assert!(limited.is_exhausted());
    }

    #[test]
    fn snapshot_reflects_bookkeeping() {
        let state = JobState::new(true, Some(2), JobStatus::Ready);
        let now = Utc::now();
        state.mark_start(now);
        state.add_success(now);
        state.mark_over(now, Duration::from_millis(40));
        state.mark_start(now);
        state.add_failure(now);
        state.mark_over(now, Duration::from_millis(20));

        let stats = state.snapshot();
        assert!(stats.singleton);
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.avg_duration, Duration::from_millis(30));
        assert_eq!(
            stats.last_start.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
        assert!(stats.last_success.is_some());
        assert!(stats.last_failed.is_some());
    }

    #[test]
    fn running_status_held_until_last_callback_leaves() {
        let state = JobState::new(false, None, JobStatus::Ready);
        state.enter_exec();
        state.enter_exec();
        assert_eq!(state.status(), JobStatus::Running);
        state.leave_exec();
        assert_eq!(state.status(), JobStatus::Running);
        assert_eq!(state.executing(), 1);
        state.leave_exec();
        assert_eq!(state.status(), JobStatus::Ready);

        let stopped = JobState::new(false, None, JobStatus::Stopped);
        stopped.enter_exec();
        assert_eq!(stopped.status(), JobStatus::Stopped);
        stopped.leave_exec();
        assert_eq!(stopped.status(), JobStatus::Stopped);
    }

    #[test]
    fn fresh_state_has_no_timestamps() {
        let stats = JobState::new(false, None, JobStatus::Stopped).snapshot();
        assert_eq!(stats.status, JobStatus::Stopped);
        assert!(stats.last_start.is_none());
        assert!(stats.last_over.is_none());
        assert_eq!(stats.avg_duration, Duration::ZERO);
    }
}
