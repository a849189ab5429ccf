use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadence_core::TimerConfig;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{Result, SchedulerError};
use crate::job::{Job, JobOptions, JobResult};
use crate::metrics::TimerMetrics;
use crate::pool::WorkerPool;
use crate::queue::PriorityQueue;
use crate::runner::{Runner, Submission};
use crate::schedule::BuildContext;
use crate::state::{StatusCell, TimerStatus};

/// State shared between the [`Timer`] handle and its tick thread.
pub(super) struct TimerInner {
    pub(super) config: TimerConfig,
    pub(super) queue: PriorityQueue<Arc<Job>>,
    pub(super) ticks: AtomicI64,
    pub(super) status: StatusCell<TimerStatus>,
    pub(super) runner: Runner,
    /// Raised by any owned job on close; the tick loop then purges the queue.
    pub(super) reap: Arc<AtomicBool>,
}

/// Owns a set of scheduled jobs and fires them from a dedicated tick
/// thread. Executions run on the timer's worker pool.
///
/// Dropping the timer closes it.
pub struct Timer {
    pub(super) inner: Arc<TimerInner>,
    stop: Mutex<Option<Sender<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Validate `config`, start the worker pool, the runner and the tick
    /// thread. The timer starts in `Running`.
    pub fn new(config: TimerConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.resolved_worker_threads();
        let pool = WorkerPool::new(threads, config.capacity())?;
        let runner = Runner::new(pool, config.interval())?;
        let inner = Arc::new(TimerInner {
            config,
            queue: PriorityQueue::new(),
            ticks: AtomicI64::new(0),
            status: StatusCell::new(TimerStatus::Running),
            runner,
            reap: Arc::new(AtomicBool::new(false)),
        });

        let (stop_tx, stop_rx) = mpsc::channel();
        let tick_inner = Arc::clone(&inner);
        let ticker = thread::Builder::new()
            .name("cadence-timer".into())
            .spawn(move || super::ticking::run(tick_inner, stop_rx))
            .map_err(|source| SchedulerError::Spawn {
                thread: "timer",
                source,
            })?;

        info!(
            interval_ms = inner.config.interval_ms,
            threads,
            capacity = ?inner.config.capacity(),
            "timer started"
        );
        Ok(Self {
            inner,
            stop: Mutex::new(Some(stop_tx)),
            ticker: Mutex::new(Some(ticker)),
        })
    }

    pub fn config(&self) -> &TimerConfig {
        &self.inner.config
    }

    // ── Registration ────────────────────────────────────────────────

    /// Build the job's schedule against the current tick and queue it.
    /// Nothing is queued when the schedule or options are invalid.
    pub fn add_job(&self, opts: JobOptions) -> Result<Arc<Job>> {
        if self.status() == TimerStatus::Closed {
            return Err(SchedulerError::Closed);
        }
        let ctx = BuildContext {
            tick: self.ticks(),
            now: Utc::now(),
            tick_interval: self.inner.config.interval(),
            cron_cap: self.inner.config.cron_recheck_ticks(),
        };
        let schedule = opts.schedule.build(&ctx)?;
        let job = Arc::new(Job::new(opts, schedule, Arc::clone(&self.inner.reap))?);
        let next_tick = job.next_tick();
        self.inner.queue.push(Arc::clone(&job), next_tick);
        info!(
            job = %job.name(),
            schedule = %job.spec(),
            singleton = job.is_singleton(),
            next_tick,
            "job added"
        );
        Ok(job)
    }

    /// Run `f` every `every`.
    pub fn add_interval<F>(&self, every: Duration, f: F) -> Result<Arc<Job>>
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.add_job(JobOptions::every(every).callback(f))
    }

    /// Run `f` every `every`, never overlapping with itself.
    pub fn add_singleton<F>(&self, every: Duration, f: F) -> Result<Arc<Job>>
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.add_job(JobOptions::every(every).singleton().callback(f))
    }

    /// Run `f` once after `delay`, then close the job.
    pub fn add_once<F>(&self, delay: Duration, f: F) -> Result<Arc<Job>>
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.add_job(JobOptions::every(delay).times(1).callback(f))
    }

    /// Run `f` every `every`, `times` times in total.
    pub fn add_times<F>(&self, every: Duration, times: u64, f: F) -> Result<Arc<Job>>
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.add_job(JobOptions::every(every).times(times).callback(f))
    }

    /// Run `f` on a cron pattern (5, 6 or 7 fields).
    pub fn add_cron<F>(&self, pattern: &str, f: F) -> Result<Arc<Job>>
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.add_job(JobOptions::cron(pattern).callback(f))
    }

    /// Run `job` now, outside its schedule. Goes through the runner, so
    /// singleton coalescing and pool limits apply.
    pub fn trigger(&self, job: &Arc<Job>) -> Submission {
        self.inner.runner.submit(Arc::clone(job))
    }

    // ── Control ─────────────────────────────────────────────────────

    /// Resume dispatching. Schedules that came due while stopped are not
    /// replayed.
    pub fn start(&self) -> bool {
        let resumed = self
            .inner
            .status
            .transition(TimerStatus::Stopped, TimerStatus::Running);
        if resumed {
            info!(tick = self.ticks(), "timer resumed");
        }
        resumed
    }

    /// Keep ticking and advancing schedules, but dispatch nothing.
    pub fn stop(&self) -> bool {
        let stopped = self
            .inner
            .status
            .transition(TimerStatus::Running, TimerStatus::Stopped);
        if stopped {
            info!(tick = self.ticks(), "timer stopped");
        }
        stopped
    }

    /// Stop the tick thread, close the runner and pool, and close every
    /// queued job. Idempotent.
    pub fn close(&self) {
        if self.inner.status.swap(TimerStatus::Closed) == TimerStatus::Closed {
            return;
        }
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        if let Some(ticker) = self.ticker.lock().take() {
            if ticker.join().is_err() {
                warn!("timer thread panicked");
            }
        }
        self.inner.runner.close();

        let jobs = self.inner.queue.drain();
        let count = jobs.len();
        for job in jobs {
            job.close();
        }
        info!(jobs = count, ticks = self.ticks(), "timer closed");
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn status(&self) -> TimerStatus {
        self.inner.status.load()
    }

    pub fn ticks(&self) -> i64 {
        self.inner.ticks.load(Ordering::Acquire)
    }

    /// Jobs currently held by the queue.
    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    /// Snapshot of the queued jobs, in no particular order.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        let mut jobs = Vec::with_capacity(self.len());
        self.inner.queue.scan(|job, _| jobs.push(Arc::clone(job)));
        jobs
    }

    /// Whether `job` is still held by the timer queue.
    pub fn contains(&self, job: &Job) -> bool {
        let mut found = false;
        self.inner.queue.scan(|queued, _| found |= queued.id() == job.id());
        found
    }

    pub fn metrics(&self) -> TimerMetrics {
        let runner = &self.inner.runner;
        let pool = runner.pool();
        let stats = runner.stats();
        TimerMetrics {
            ticks: self.ticks(),
            status: self.status(),
            queued_jobs: self.len(),
            pending_dispatch: stats.queued,
            pool_threads: pool.threads(),
            pool_running: pool.running(),
            pool_waiting: pool.waiting(),
            pool_capacity: pool.capacity(),
            dispatched: stats.dispatched,
            coalesced: stats.coalesced,
            rejected: stats.rejected,
            worker_panics: pool.panics(),
        }
    }

    /// Change the pool's in-flight limit. `None` removes it.
    pub fn tune_pool(&self, capacity: Option<usize>) {
        self.inner.runner.pool().tune(capacity);
        info!(capacity = ?capacity, "pool capacity tuned");
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("status", &self.status())
            .field("ticks", &self.ticks())
            .field("jobs", &self.len())
            .finish()
    }
}
