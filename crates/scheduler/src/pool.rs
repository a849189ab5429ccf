//! Bounded worker pool on top of a rayon thread pool.
//!
//! Capacity is an admission limit: tasks that are waiting for a worker
//! thread count against it just like tasks that are running. A full pool
//! rejects instead of queueing without bound.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use cadence_core::trace::panic_message;
use tracing::{debug, error, info};

use crate::error::{PoolError, SchedulerError};

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    running: AtomicUsize,
    waiting: AtomicUsize,
    panics: AtomicU64,
}

/// Decrements the running/in-flight counters even if the task panics.
struct Slot(Arc<Counters>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::AcqRel);
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Fixed set of worker threads with an adjustable in-flight limit.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
    /// 0 means unlimited.
    capacity: AtomicUsize,
    closed: AtomicBool,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Build a pool with `threads` workers. `capacity` of `None` admits
    /// any number of tasks.
    pub fn new(threads: usize, capacity: Option<usize>) -> Result<Self, SchedulerError> {
        let threads = threads.max(1);
        let counters = Arc::new(Counters::default());
        let panic_counters = Arc::clone(&counters);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("cadence-worker-{i}"))
            .panic_handler(move |payload| {
                panic_counters.panics.fetch_add(1, Ordering::Relaxed);
                error!(panic = %panic_message(payload.as_ref()), "worker task panicked");
            })
            .build()?;
        info!(threads, capacity = ?capacity, "worker pool started");
        Ok(Self {
            pool,
            threads,
            capacity: AtomicUsize::new(capacity.unwrap_or(0)),
            closed: AtomicBool::new(false),
            counters,
        })
    }

    /// Admit `task` or reject it. Never blocks.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        let capacity = self.capacity.load(Ordering::Acquire);
        self.counters
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (capacity == 0 || n < capacity).then_some(n + 1)
            })
            .map_err(|_| PoolError::Full { capacity })?;
        self.counters.waiting.fetch_add(1, Ordering::AcqRel);

        let counters = Arc::clone(&self.counters);
        self.pool.spawn(move || {
            counters.waiting.fetch_sub(1, Ordering::AcqRel);
            counters.running.fetch_add(1, Ordering::AcqRel);
            let _slot = Slot(counters);
            task();
        });
        Ok(())
    }

    /// Change the in-flight limit. Tasks already admitted are unaffected.
    pub fn tune(&self, capacity: Option<usize>) {
        self.capacity.store(capacity.unwrap_or(0), Ordering::Release);
        debug!(capacity = ?capacity, "worker pool capacity changed");
    }

    pub fn capacity(&self) -> Option<usize> {
        match self.capacity.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    /// How many more tasks would be admitted right now.
    pub fn free_slots(&self) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        match self.capacity() {
            None => usize::MAX,
            Some(cap) => cap.saturating_sub(self.in_flight()),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::Acquire)
    }

    pub fn waiting(&self) -> usize {
        self.counters.waiting.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Number of tasks that panicked on a worker thread.
    pub fn panics(&self) -> u64 {
        self.counters.panics.load(Ordering::Relaxed)
    }

    /// Stop admitting work. Admitted tasks still run.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(in_flight = self.in_flight(), "worker pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("capacity", &self.capacity())
            .field("running", &self.running())
            .field("waiting", &self.waiting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn runs_submitted_tasks() {
        let pool = WorkerPool::new(2, None).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap()).unwrap();
        }
        let mut got: Vec<i32> = (0..10).map(|_| rx.recv().unwrap()).collect();
        got.sort();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        wait_until(|| pool.in_flight() == 0);
    }

    #[test]
    fn rejects_when_full_and_recovers() {
        let pool = WorkerPool::new(1, Some(2)).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(parking_lot::Mutex::new(release_rx));
        for _ in 0..2 {
            let rx = Arc::clone(&release_rx);
            pool.submit(move || {
                let _ = rx.lock().recv();
            })
            .unwrap();
        }
        assert_eq!(pool.free_slots(), 0);
        assert_eq!(pool.submit(|| {}), Err(PoolError::Full { capacity: 2 }));

        wait_until(|| pool.running() == 1 && pool.waiting() == 1);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        wait_until(|| pool.in_flight() == 0);
        assert_eq!(pool.free_slots(), 2);
        pool.submit(|| {}).unwrap();
    }

    #[test]
    fn tune_changes_limit() {
        let pool = WorkerPool::new(1, Some(1)).unwrap();
        assert_eq!(pool.capacity(), Some(1));
        pool.tune(Some(5));
        assert_eq!(pool.free_slots(), 5);
        pool.tune(None);
        assert_eq!(pool.capacity(), None);
        assert_eq!(pool.free_slots(), usize::MAX);
    }

    #[test]
    fn panic_does_not_leak_slot() {
        let pool = WorkerPool::new(1, Some(1)).unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        wait_until(|| pool.panics() == 1 && pool.in_flight() == 0);

        let (tx, rx) = mpsc::channel();
        pool.submit(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn closed_pool_rejects() {
        let pool = WorkerPool::new(1, None).unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.submit(|| {}), Err(PoolError::Closed));
        assert_eq!(pool.free_slots(), 0);
    }
}
