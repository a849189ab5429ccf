use std::sync::OnceLock;

use cadence_core::TimerConfig;

use super::core::Timer;
use crate::error::{Result, SchedulerError};

static DEFAULT_TIMER: OnceLock<Timer> = OnceLock::new();

/// Create the process-wide default timer. Succeeds exactly once; later
/// calls return [`SchedulerError::AlreadyInitialized`] and leave the
/// existing timer untouched. The default timer lives for the rest of the
/// process.
pub fn init_default(config: TimerConfig) -> Result<&'static Timer> {
    if DEFAULT_TIMER.get().is_some() {
        return Err(SchedulerError::AlreadyInitialized);
    }
    let timer = Timer::new(config)?;
    // Lost a race with another initializer: the spare timer is dropped,
    // which closes it.
    DEFAULT_TIMER
        .set(timer)
        .map_err(|_| SchedulerError::AlreadyInitialized)?;
    DEFAULT_TIMER.get().ok_or(SchedulerError::AlreadyInitialized)
}

/// The default timer, if [`init_default`] has run.
pub fn default_timer() -> Option<&'static Timer> {
    DEFAULT_TIMER.get()
}
