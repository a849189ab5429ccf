//! Runner: turns due triggers into pool executions.
//!
//! Split into focused submodules:
//! - `core`: Runner struct, submission with singleton coalescing, accessors
//! - `dispatch`: the dispatch thread draining the FIFO into the worker pool

mod core;
mod dispatch;

pub use self::core::{Runner, RunnerStats, Submission};
