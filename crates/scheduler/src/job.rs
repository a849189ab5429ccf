//! [`Job`]: a callback bound to a schedule and its run state.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cadence_core::TracedError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::schedule::{Advance, Schedule, ScheduleSpec};
use crate::state::{JobState, JobStats, JobStatus, RunClaim};

/// What a callback asks the scheduler to do after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep the job scheduled.
    Continue,
    /// Close the job gracefully; no further runs are scheduled.
    Exit,
}

/// Callback return type. `Err` is recorded in the job's error directory.
pub type JobResult = Result<Control, TracedError>;

/// Shared job callback.
pub type JobCallback = Arc<dyn Fn(&Job) -> JobResult + Send + Sync + 'static>;

// ── JobOptions ──────────────────────────────────────────────────────

/// Everything needed to add a job to a timer.
///
/// # Example
/// ```ignore
/// let job = timer.add_job(
///     JobOptions::every(Duration::from_secs(30))
///         .name("heartbeat")
///         .singleton()
///         .callback(|_job| Ok(Control::Continue)),
/// )?;
/// ```
#[derive(Clone)]
pub struct JobOptions {
    pub(crate) name: Option<String>,
    pub(crate) schedule: ScheduleSpec,
    pub(crate) callback: Option<JobCallback>,
    pub(crate) singleton: bool,
    pub(crate) times: Option<u64>,
    pub(crate) status: JobStatus,
}

impl JobOptions {
    pub fn new(schedule: ScheduleSpec) -> Self {
        Self {
            name: None,
            schedule,
            callback: None,
            singleton: false,
            times: None,
            status: JobStatus::Ready,
        }
    }

    /// Fixed-interval job.
    pub fn every(interval: std::time::Duration) -> Self {
        Self::new(ScheduleSpec::Every(interval))
    }

    /// Cron job; the pattern is parsed when the job is added.
    pub fn cron(pattern: impl Into<String>) -> Self {
        Self::new(ScheduleSpec::Cron(pattern.into()))
    }

    /// Job that fires whenever any of `schedules` fires.
    pub fn any(schedules: Vec<ScheduleSpec>) -> Self {
        Self::new(ScheduleSpec::Any(schedules))
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// At most one execution in flight; overlapping triggers coalesce.
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Run at most `times` times in total, then close.
    pub fn times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    /// Add the job stopped. It keeps its schedule but runs only after `start()`.
    pub fn paused(mut self) -> Self {
        self.status = JobStatus::Stopped;
        self
    }

    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for JobOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobOptions")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("singleton", &self.singleton)
            .field("times", &self.times)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ── Job ─────────────────────────────────────────────────────────────

/// A scheduled callback.
///
/// Jobs are owned by the timer queue (and transiently by the runner's
/// pending list). `close()` flags the owning timer, which drops the job
/// from its queue on the next tick.
pub struct Job {
    id: Uuid,
    name: String,
    spec: ScheduleSpec,
    schedule: Mutex<Schedule>,
    callback: JobCallback,
    state: JobState,
    closed_tx: watch::Sender<bool>,
    /// Raised on close so the owning timer purges its queue.
    reap: Arc<AtomicBool>,
}

impl Job {
    pub(crate) fn new(
        opts: JobOptions,
        schedule: Schedule,
        reap: Arc<AtomicBool>,
    ) -> Result<Self, SchedulerError> {
        let id = Uuid::new_v4();
        let name = opts
            .name
            .unwrap_or_else(|| format!("job-{}", &id.simple().to_string()[..8]));
        let callback = opts
            .callback
            .ok_or_else(|| SchedulerError::MissingCallback(name.clone()))?;
        let (closed_tx, _) = watch::channel(false);
        Ok(Self {
            id,
            name,
            spec: opts.schedule,
            schedule: Mutex::new(schedule),
            callback,
            state: JobState::new(opts.singleton, opts.times, opts.status),
            closed_tx,
            reap,
        })
    }

    /// Build a job outside any timer, anchored at tick 0 with a 10ms tick.
    #[cfg(test)]
    pub(crate) fn detached(opts: JobOptions) -> Self {
        let ctx = crate::schedule::BuildContext {
            tick: 0,
            now: Utc::now(),
            tick_interval: std::time::Duration::from_millis(10),
            cron_cap: 100,
        };
        let schedule = opts.schedule.build(&ctx).unwrap();
        Self::new(opts, schedule, Arc::default()).unwrap()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schedule this job was created from.
    pub fn spec(&self) -> &ScheduleSpec {
        &self.spec
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_closed(&self) -> bool {
        self.status() == JobStatus::Closed
    }

    pub fn is_singleton(&self) -> bool {
        self.state.is_singleton()
    }

    /// Resume a stopped job. Returns whether the status changed.
    pub fn start(&self) -> bool {
        let resumed = self
            .state
            .status_cell()
            .transition(JobStatus::Stopped, JobStatus::Ready);
        if resumed {
            if self.state.executing() > 0 {
                self.state
                    .status_cell()
                    .transition(JobStatus::Ready, JobStatus::Running);
            }
            info!(job = %self.name, "job started");
        }
        resumed
    }

    /// Pause the job. It keeps advancing through its schedule without
    /// running, so `start()` does not replay missed occurrences.
    pub fn stop(&self) -> bool {
        let cell = self.state.status_cell();
        loop {
            let current = cell.load();
            if matches!(current, JobStatus::Stopped | JobStatus::Closed) {
                return false;
            }
            if cell.transition(current, JobStatus::Stopped) {
                info!(job = %self.name, "job stopped");
                return true;
            }
        }
    }

    /// Close the job for good. In-flight runs finish; nothing new starts.
    pub fn close(&self) {
        let previous = self.state.status_cell().swap(JobStatus::Closed);
        if previous != JobStatus::Closed {
            self.reap.store(true, Ordering::Release);
            self.closed_tx.send_replace(true);
            info!(job = %self.name, "job closed");
        }
    }

    /// Replace the remaining run budget with `times` runs.
    pub fn set_times(&self, times: u64) {
        self.state.set_times(Some(times));
    }

    /// Remove the run limit.
    pub fn clear_times(&self) {
        self.state.set_times(None);
    }

    /// Snapshot of status, counters and error history.
    pub fn state(&self) -> JobStats {
        self.state.snapshot()
    }

    /// Resolves once the job is closed. Long-running callbacks can race
    /// their work against this for cooperative cancellation.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Next wall-clock fire time for cron-based jobs.
    pub fn next_start(&self) -> Option<DateTime<Utc>> {
        self.schedule.lock().next_start()
    }

    pub(crate) fn run_state(&self) -> &JobState {
        &self.state
    }

    pub(crate) fn next_tick(&self) -> i64 {
        self.schedule.lock().next_tick()
    }

    /// Evaluate the schedule at `(tick, now)` and commit the result.
    pub(crate) fn check_schedule(&self, tick: i64, now: DateTime<Utc>) -> Advance {
        self.schedule.lock().check(tick, now)
    }

    /// Execute the callback once on the current thread.
    ///
    /// Errors are recorded and swallowed. A panic is recorded and then
    /// re-raised so the pool observes it; bookkeeping is finished first.
    /// The run that spends the budget closes the job after it returns.
    pub(crate) fn exec_once(&self) {
        let last = match self.state.claim_run() {
            RunClaim::Exhausted => {
                debug!(job = %self.name, "run budget exhausted, skipping");
                return;
            }
            RunClaim::Granted { last } => last,
        };

        let started = Instant::now();
        self.state.mark_start(Utc::now());
        self.state.enter_exec();

        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(self)));

        let mut repanic = None;
        match result {
            Ok(Ok(Control::Continue)) => self.state.add_success(Utc::now()),
            Ok(Ok(Control::Exit)) => {
                self.state.add_success(Utc::now());
                debug!(job = %self.name, "callback requested exit");
                self.close();
            }
            Ok(Err(err)) => {
                self.state.add_failure(Utc::now());
                let occurrences = self.state.errors().record(&err);
                warn!(job = %self.name, error = %err, occurrences, "job callback failed");
            }
            Err(payload) => {
                let err = TracedError::from_panic(payload);
                self.state.add_failure(Utc::now());
                let occurrences = self.state.errors().record(&err);
                error!(job = %self.name, error = %err, occurrences, "job callback panicked");
                repanic = Some(err);
            }
        }

        self.state.mark_over(Utc::now(), started.elapsed());
        self.state.leave_exec();
        if last {
            debug!(job = %self.name, "run budget spent");
            self.close();
        }

        if let Some(err) = repanic {
            panic::resume_unwind(Box::new(err));
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
