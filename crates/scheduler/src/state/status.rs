use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Scheduled and idle.
    Ready,
    /// A callback is currently executing.
    Running,
    /// Paused: keeps its schedule position, does not execute.
    Stopped,
    /// Terminal. Dropped from the timer on its next pop.
    Closed,
}

/// Lifecycle of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Running,
    Stopped,
    Closed,
}

/// Enum stored as a single byte, so it can live in an atomic.
pub trait AtomicEnum: Copy + Eq {
    fn to_u8(self) -> u8;
    fn from_u8(raw: u8) -> Self;
}

impl AtomicEnum for JobStatus {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobStatus::Ready,
            1 => JobStatus::Running,
            2 => JobStatus::Stopped,
            _ => JobStatus::Closed,
        }
    }
}

impl AtomicEnum for TimerStatus {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TimerStatus::Running,
            1 => TimerStatus::Stopped,
            _ => TimerStatus::Closed,
        }
    }
}

/// Lock-free cell holding an [`AtomicEnum`].
pub struct StatusCell<S: AtomicEnum> {
    raw: AtomicU8,
    _kind: std::marker::PhantomData<S>,
}

impl<S: AtomicEnum> StatusCell<S> {
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.to_u8()),
            _kind: std::marker::PhantomData,
        }
    }

    pub fn load(&self) -> S {
        S::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Unconditional store; returns the previous value.
    pub fn swap(&self, next: S) -> S {
        S::from_u8(self.raw.swap(next.to_u8(), Ordering::AcqRel))
    }

    /// Compare-and-swap `from -> to`. Returns whether the transition happened.
    pub fn transition(&self, from: S, to: S) -> bool {
        self.raw
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<S: AtomicEnum + fmt::Debug> fmt::Debug for StatusCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatusCell").field(&self.load()).finish()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Stopped => write!(f, "stopped"),
            JobStatus::Closed => write!(f, "closed"),
        }
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerStatus::Running => write!(f, "running"),
            TimerStatus::Stopped => write!(f, "stopped"),
            TimerStatus::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for s in [JobStatus::Ready, JobStatus::Running, JobStatus::Stopped, JobStatus::Closed] {
            assert_eq!(JobStatus::from_u8(s.to_u8()), s);
        }
        for s in [TimerStatus::Running, TimerStatus::Stopped, TimerStatus::Closed] {
            assert_eq!(TimerStatus::from_u8(s.to_u8()), s);
        }
    }

    #[test]
    fn transition_only_from_expected_state() {
        let cell = StatusCell::new(JobStatus::Ready);
        assert!(!cell.transition(JobStatus::Stopped, JobStatus::Ready));
        assert!(cell.transition(JobStatus::Ready, JobStatus::Running));
        assert_eq!(cell.load(), JobStatus::Running);
        assert_eq!(cell.swap(JobStatus::Closed), JobStatus::Running);
        assert_eq!(cell.load(), JobStatus::Closed);
    }
}
