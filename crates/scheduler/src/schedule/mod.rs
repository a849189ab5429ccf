//! Scheduling policies: when is a job due, and when is it next looked at.
//!
//! Every policy splits into a pure probe ([`Schedule::cal_next`]) and a
//! commit ([`Schedule::check`]). Groups rely on the split to probe children
//! before deciding which of them to advance.

mod cron;
mod group;
mod interval;
mod spec;


use chrono::{DateTime, Utc};

pub use self::cron::{normalize_cron, CronSchedule};
pub use group::ScheduleGroup;
pub use interval::IntervalSchedule;
pub use spec::{BuildContext, ScheduleSpec};

/// Result of evaluating a schedule at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// The job should run at this tick.
    pub due: bool,
    /// Tick at which the schedule wants to be examined again.
    pub next_tick: i64,
    /// Next wall-clock fire time, for wall-clock anchored schedules.
    pub next_start: Option<DateTime<Utc>>,
    /// No further occurrences exist; the job should be closed after this one.
    pub exhausted: bool,
}

/// A scheduling policy.
#[derive(Debug)]
pub enum Schedule {
    /// Every `n` ticks.
    Interval(IntervalSchedule),
    /// Wall-clock cron expression.
    Cron(CronSchedule),
    /// Union of several schedules behind one timer entry.
    Group(ScheduleGroup),
}

impl Schedule {
    /// Evaluate at `(tick, now)` without mutating anything.
    pub fn cal_next(&self, tick: i64, now: DateTime<Utc>) -> Advance {
        match self {
            Schedule::Interval(s) => s.cal_next(tick),
            Schedule::Cron(s) => s.cal_next(tick, now),
            Schedule::Group(s) => s.cal_next(tick, now),
        }
    }

    /// Evaluate and commit the new position.
    pub fn check(&mut self, tick: i64, now: DateTime<Utc>) -> Advance {
        match self {
            Schedule::Interval(s) => s.check(tick),
            Schedule::Cron(s) => s.check(tick, now),
            Schedule::Group(s) => s.check(tick, now),
        }
    }

    /// Tick at which this schedule next needs attention.
    pub fn next_tick(&self) -> i64 {
        match self {
            Schedule::Interval(s) => s.next_tick(),
            Schedule::Cron(s) => s.next_tick(),
            Schedule::Group(s) => s.next_tick(),
        }
    }

    /// Next wall-clock fire time, if the schedule is wall-clock anchored.
    pub fn next_start(&self) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval(_) => None,
            Schedule::Cron(s) => s.next_start(),
            Schedule::Group(s) => s.next_start(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Interval(_) => "interval",
            Schedule::Cron(_) => "cron",
            Schedule::Group(_) => "group",
        }
    }
}
