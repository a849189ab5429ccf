use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::TracedError;
use tracing::{debug, info, warn};

use super::core::Shared;
use crate::job::Job;

/// Dispatch loop. Blocks until the runner is closed.
pub(super) fn run(shared: Arc<Shared>, wake: Receiver<()>, idle_wait: Duration) {
    info!("dispatch loop started");
    while !shared.closed.load(Ordering::Acquire) {
        dispatch_ready(&shared);
        match wake.recv_timeout(idle_wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("dispatch loop stopped");
}

/// Move jobs from the FIFO into the pool while it has room.
///
/// The FIFO lock covers only the counter moves; submission to the pool
/// happens with it released.
fn dispatch_ready(shared: &Arc<Shared>) {
    while shared.pool.free_slots() > 0 && !shared.closed.load(Ordering::Acquire) {
        let job = {
            let mut pending = shared.pending.lock();
            let Some(job) = pending.pop_front() else {
                return;
            };
            let state = job.run_state();
            if job.is_closed() {
                state.clear_pending();
                debug!(job = %job.name(), "dropping triggers of closed job");
                continue;
            }
            state.add_pending(-1);
            state.add_running(1);
            // Concurrent runs are allowed for non-singletons: keep
            // draining this job's backlog.
            if !state.is_singleton() && state.pending() > 0 {
                pending.push_back(Arc::clone(&job));
            }
            job
        };

        let task_shared = Arc::clone(shared);
        let task_job = Arc::clone(&job);
        let submitted = shared.pool.submit(move || {
            let done = Completion {
                shared: task_shared,
                job: task_job,
            };
            done.job.exec_once();
        });

        match submitted {
            Ok(()) => {
                shared.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                requeue_refused(shared, &job);
                shared.rejected.fetch_add(1, Ordering::Relaxed);
                let traced = TracedError::from(err);
                let occurrences = job.run_state().errors().record(&traced);
                warn!(job = %job.name(), error = %err, occurrences, "pool refused execution");
                return;
            }
        }
    }
}

/// Undo the counter moves of a refused dispatch and put the job back at
/// the head of the FIFO.
pub(super) fn requeue_refused(shared: &Shared, job: &Arc<Job>) {
    let state = job.run_state();
    let mut pending = shared.pending.lock();
    state.add_running(-1);
    if job.is_closed() {
        state.clear_pending();
        return;
    }
    // A singleton triggered while the refused run was counted as running
    // already holds its one pending trigger.
    if !state.is_singleton() || state.pending() == 0 {
        state.add_pending(1);
    }
    pending.push_front(Arc::clone(job));
}

/// Finishes one execution's bookkeeping, including when the callback
/// panics and the worker unwinds.
struct Completion {
    shared: Arc<Shared>,
    job: Arc<Job>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let state = self.job.run_state();
        {
            let mut pending = self.shared.pending.lock();
            state.add_running(-1);
            if self.job.is_closed() {
                state.clear_pending();
            } else if state.is_singleton() && state.pending() > 0 {
                pending.push_back(Arc::clone(&self.job));
            }
        }
        self.shared.signal();
    }
}
