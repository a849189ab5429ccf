use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{CronSchedule, IntervalSchedule, Schedule, ScheduleGroup};
use crate::error::SchedulerError;

/// User-facing description of when a job runs. Turned into a live
/// [`Schedule`] when the job is added to a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Fixed interval, rounded down to whole ticks (minimum one tick).
    Every(Duration),
    /// Cron expression, 5 fields (minute resolution) or 6/7 fields.
    Cron(String),
    /// Fire whenever any of the inner specs fires.
    Any(Vec<ScheduleSpec>),
}

/// Timer position and tuning needed to anchor a new schedule.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext {
    /// Current value of the timer's tick counter.
    pub tick: i64,
    /// Current wall-clock time.
    pub now: DateTime<Utc>,
    /// Width of one tick.
    pub tick_interval: Duration,
    /// Upper bound on ticks between cron re-checks.
    pub cron_cap: i64,
}

impl BuildContext {
    fn ticks_for(&self, every: Duration) -> i64 {
        let interval = self.tick_interval.as_nanos().max(1);
        let ticks = every.as_nanos() / interval;
        (ticks.min(i64::MAX as u128) as i64).max(1)
    }
}

impl ScheduleSpec {
    /// Build the live schedule. Fails on zero intervals, unparseable cron
    /// expressions and empty groups; nothing is created on failure.
    pub fn build(&self, ctx: &BuildContext) -> Result<Schedule, SchedulerError> {
        match self {
            ScheduleSpec::Every(every) => {
                if every.is_zero() {
                    return Err(SchedulerError::InvalidInterval(
                        "interval must be greater than zero".into(),
                    ));
                }
                Ok(Schedule::Interval(IntervalSchedule::new(
                    ctx.ticks_for(*every),
                    ctx.tick,
                )))
            }
            ScheduleSpec::Cron(pattern) => Ok(Schedule::Cron(CronSchedule::parse(
                pattern,
                ctx.cron_cap,
                ctx.tick_interval,
                ctx.tick,
                ctx.now,
            )?)),
            ScheduleSpec::Any(specs) => {
                let schedules = specs
                    .iter()
                    .map(|spec| spec.build(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Schedule::Group(ScheduleGroup::new(schedules)?))
            }
        }
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::Every(every) => write!(f, "every {every:?}"),
            ScheduleSpec::Cron(pattern) => write!(f, "cron '{pattern}'"),
            ScheduleSpec::Any(specs) => {
                write!(f, "any[")?;
                for (i, spec) in specs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{spec}")?;
                }
                write!(f, "]")
            }
        }
    }
}
