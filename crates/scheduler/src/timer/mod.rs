//! Tick-driven timer.
//!
//! Split into focused submodules:
//! - `core`: Timer struct, construction, job registration and control
//! - `ticking`: the tick thread and the per-tick `proceed` pass
//! - `default`: process-wide default timer with init-once semantics

mod core;
mod default;
mod ticking;
#[cfg(test)]
mod tests;

pub use self::core::Timer;
pub use self::default::{default_timer, init_default};
