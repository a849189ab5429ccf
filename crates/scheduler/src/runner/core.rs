use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::job::Job;
use crate::pool::WorkerPool;

/// What happened to a trigger handed to [`Runner::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Counted as pending; it will run when the pool has room.
    Queued,
    /// Singleton already pending; the trigger was dropped.
    Coalesced,
    /// Job or runner is closed.
    Refused,
}

/// Runner counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunnerStats {
    /// Jobs currently waiting in the FIFO.
    pub queued: usize,
    /// Executions handed to the pool.
    pub dispatched: u64,
    /// Singleton triggers dropped because one was already pending.
    pub coalesced: u64,
    /// Dispatch attempts the pool refused.
    pub rejected: u64,
}

/// FIFO of jobs with outstanding triggers. A job appears at most once.
#[derive(Debug, Default)]
pub(super) struct Pending {
    pub(super) fifo: VecDeque<Arc<Job>>,
    pub(super) queued: HashSet<Uuid>,
}

impl Pending {
    pub(super) fn push_back(&mut self, job: Arc<Job>) {
        if self.queued.insert(job.id()) {
            self.fifo.push_back(job);
        }
    }

    pub(super) fn push_front(&mut self, job: Arc<Job>) {
        if self.queued.insert(job.id()) {
            self.fifo.push_front(job);
        }
    }

    pub(super) fn pop_front(&mut self) -> Option<Arc<Job>> {
        let job = self.fifo.pop_front()?;
        self.queued.remove(&job.id());
        Some(job)
    }
}

pub(super) struct Shared {
    pub(super) pool: WorkerPool,
    /// Guards the FIFO and every pending/running counter update.
    pub(super) pending: Mutex<Pending>,
    pub(super) wake: SyncSender<()>,
    pub(super) closed: AtomicBool,
    pub(super) dispatched: AtomicU64,
    pub(super) coalesced: AtomicU64,
    pub(super) rejected: AtomicU64,
}

impl Shared {
    /// Nudge the dispatch thread. A full channel already means "wake up".
    pub(super) fn signal(&self) {
        match self.wake.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                debug!("dispatch thread gone, wakeup dropped");
            }
        }
    }
}

/// Executes triggered jobs on a bounded [`WorkerPool`].
///
/// Triggers are counted per job and drained in FIFO order by a dedicated
/// dispatch thread. When the pool is full the FIFO simply waits; the
/// dispatch thread re-checks on every completion and at least once per
/// `idle_wait`.
pub struct Runner {
    pub(super) shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Runner {
    pub fn new(pool: WorkerPool, idle_wait: Duration) -> Result<Self, SchedulerError> {
        let (wake, wake_rx) = mpsc::sync_channel(1);
        let shared = Arc::new(Shared {
            pool,
            pending: Mutex::new(Pending::default()),
            wake,
            closed: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("cadence-dispatch".into())
            .spawn(move || super::dispatch::run(loop_shared, wake_rx, idle_wait))
            .map_err(|source| SchedulerError::Spawn {
                thread: "dispatch",
                source,
            })?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Register one trigger for `job`.
    ///
    /// Singleton jobs hold at most one pending trigger; further triggers
    /// are dropped until that one starts. A singleton that is running gets
    /// its pending trigger re-queued when the run completes.
    pub fn submit(&self, job: Arc<Job>) -> Submission {
        if self.shared.closed.load(Ordering::Acquire) || job.is_closed() {
            return Submission::Refused;
        }

        let state = job.run_state();
        let mut pending = self.shared.pending.lock();
        if state.is_singleton() {
            if state.pending() > 0 {
                drop(pending);
                self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(job = %job.name(), "singleton trigger coalesced");
                return Submission::Coalesced;
            }
            state.add_pending(1);
            if state.running() == 0 {
                pending.push_back(job);
            }
        } else {
            state.add_pending(1);
            pending.push_back(job);
        }
        drop(pending);

        self.shared.signal();
        Submission::Queued
    }

    /// Jobs waiting in the FIFO for a pool slot.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().fifo.len()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.shared.pool
    }

    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            queued: self.pending_len(),
            dispatched: self.shared.dispatched.load(Ordering::Relaxed),
            coalesced: self.shared.coalesced.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop dispatching, drop queued triggers and close the pool. Runs
    /// already handed to the pool finish on their own.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.signal();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("dispatch thread panicked");
            }
        }

        let dropped = {
            let mut pending = self.shared.pending.lock();
            let mut dropped = 0usize;
            while let Some(job) = pending.pop_front() {
                job.run_state().clear_pending();
                dropped += 1;
            }
            dropped
        };
        self.shared.pool.close();
        info!(dropped, "runner closed");
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("pool", &self.shared.pool)
            .field("stats", &self.stats())
            .finish()
    }
}
