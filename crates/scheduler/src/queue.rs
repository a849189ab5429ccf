//! Mutex-guarded binary min-heap with a lock-free view of its minimum.
//!
//! The tick loop polls [`PriorityQueue::next_priority`] on every tick; that
//! read is a single atomic load, so the lock is only taken when something
//! is actually due.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

/// Priority reported by an empty queue.
pub const EMPTY_PRIORITY: i64 = i64::MAX;

#[derive(Debug)]
struct Item<T> {
    value: T,
    priority: i64,
}

/// Min-heap keyed by `i64` priority. Lower priority pops first.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: Mutex<Vec<Item<T>>>,
    next_priority: AtomicI64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(Vec::new()),
            next_priority: AtomicI64::new(EMPTY_PRIORITY),
        }
    }

    /// Insert `value`; sift up and lower the cached minimum if needed.
    pub fn push(&self, value: T, priority: i64) {
        let mut heap = self.heap.lock();
        heap.push(Item { value, priority });
        let last = heap.len() - 1;
        sift_up(&mut heap, last);
        self.next_priority.fetch_min(priority, Ordering::AcqRel);
    }

    /// Remove and return the minimum.
    pub fn pop(&self) -> Option<T> {
        let mut heap = self.heap.lock();
        self.pop_locked(&mut heap)
    }

    /// Remove and return the minimum only if its priority is `<= max_priority`.
    ///
    /// Inspection and removal happen under one lock acquisition, so a
    /// concurrent `push` cannot slip a different root in between.
    pub fn pop_due(&self, max_priority: i64) -> Option<(T, i64)> {
        let mut heap = self.heap.lock();
        let priority = heap.first().map(|item| item.priority)?;
        if priority > max_priority {
            return None;
        }
        self.pop_locked(&mut heap).map(|value| (value, priority))
    }

    /// Minimum priority without taking the lock. [`EMPTY_PRIORITY`] when empty.
    pub fn next_priority(&self) -> i64 {
        self.next_priority.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Visit every element with its priority, in heap (not sorted) order.
    pub fn scan(&self, mut f: impl FnMut(&T, i64)) {
        let heap = self.heap.lock();
        for item in heap.iter() {
            f(&item.value, item.priority);
        }
    }

    /// Drain all elements, leaving the queue empty.
    pub fn drain(&self) -> Vec<T> {
        let mut heap = self.heap.lock();
        self.next_priority.store(EMPTY_PRIORITY, Ordering::Release);
        heap.drain(..).map(|item| item.value).collect()
    }

    /// Keep only the elements for which `keep` returns true and restore
    /// the heap order. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut heap = self.heap.lock();
        let before = heap.len();
        heap.retain(|item| keep(&item.value));
        let removed = before - heap.len();
        if removed > 0 {
            for idx in (0..heap.len() / 2).rev() {
                sift_down(&mut heap, idx);
            }
            let next = heap.first().map_or(EMPTY_PRIORITY, |root| root.priority);
            self.next_priority.store(next, Ordering::Release);
        }
        removed
    }

    fn pop_locked(&self, heap: &mut Vec<Item<T>>) -> Option<T> {
        if heap.is_empty() {
            return None;
        }
        let last = heap.len() - 1;
        heap.swap(0, last);
        let item = heap.pop()?;
        sift_down(heap, 0);
        let next = heap.first().map_or(EMPTY_PRIORITY, |root| root.priority);
        self.next_priority.store(next, Ordering::Release);
        Some(item.value)
    }
}

impl<T: Clone> PriorityQueue<T> {
    /// Clone of the minimum without removing it.
    pub fn fetch(&self) -> Option<T> {
        self.heap.lock().first().map(|item| item.value.clone())
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn sift_up<T>(heap: &mut [Item<T>], mut idx: usize) {
    while idx > 0 {
        let parent = (idx - 1) / 2;
        if heap[parent].priority <= heap[idx].priority {
            break;
        }
        heap.swap(parent, idx);
        idx = parent;
    }
}

fn sift_down<T>(heap: &mut [Item<T>], mut idx: usize) {
    let len = heap.len();
    loop {
        let left = 2 * idx + 1;
        let right = left + 1;
        let mut smallest = idx;
        if left < len && heap[left].priority < heap[smallest].priority {
            smallest = left;
        }
        if right < len && heap[right].priority < heap[smallest].priority {
            smallest = right;
        }
        if smallest == idx {
            break;
        }
        heap.swap(idx, smallest);
        idx = smallest;
    }
}
