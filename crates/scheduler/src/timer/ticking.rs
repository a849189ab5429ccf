use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use super::core::TimerInner;
use crate::runner::Submission;
use crate::state::{JobStatus, TimerStatus};

/// Fixed-period tick loop. Exits when the stop channel fires or the timer
/// is closed.
pub(super) fn run(inner: Arc<TimerInner>, stop: Receiver<()>) {
    let interval = inner.config.interval();
    let mut deadline = Instant::now() + interval;
    info!(interval_ms = inner.config.interval_ms, "tick loop started");

    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if inner.status.load() == TimerStatus::Closed {
            break;
        }

        // Missed periods are skipped, not replayed as a burst.
        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            deadline = now + interval;
        }

        let tick = inner.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        if inner.reap.swap(false, Ordering::AcqRel) {
            inner.reap_closed(tick);
        }
        if tick < inner.queue.next_priority() {
            continue;
        }
        inner.proceed(tick, Utc::now());
    }
    info!(ticks = inner.ticks.load(Ordering::Acquire), "tick loop stopped");
}

impl TimerInner {
    /// Remove closed jobs from the queue wherever they sit in it.
    pub(super) fn reap_closed(&self, tick: i64) -> usize {
        let removed = self.queue.retain(|job| !job.is_closed());
        if removed > 0 {
            debug!(tick, removed, "purged closed jobs");
        }
        removed
    }

    /// Pop every job whose priority has been reached, fire the due ones
    /// and push the survivors back at their next tick.
    pub(super) fn proceed(&self, tick: i64, now: DateTime<Utc>) {
        let dispatching = self.status.load() == TimerStatus::Running;
        let mut fired = 0usize;
        let mut examined = 0usize;

        while let Some((job, _)) = self.queue.pop_due(tick) {
            examined += 1;
            if job.is_closed() {
                debug!(job = %job.name(), tick, "dropping closed job");
                continue;
            }

            let advance = job.check_schedule(tick, now);
            let mut submitted = false;
            if advance.due && dispatching && job.status() != JobStatus::Stopped {
                if advance.exhausted {
                    job.run_state().cap_remaining(1);
                }
                submitted = self.runner.submit(Arc::clone(&job)) != Submission::Refused;
                fired += usize::from(submitted);
            }

            if advance.exhausted {
                // The final run, if one was submitted, closes the job itself.
                if !submitted {
                    job.close();
                }
                debug!(job = %job.name(), tick, "schedule exhausted");
                continue;
            }
            self.queue.push(job, advance.next_tick.max(tick + 1));
        }

        trace!(tick, examined, fired, "proceed");
    }
}
