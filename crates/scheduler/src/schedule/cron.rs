//! Wall-clock cron schedules.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::Advance;
use crate::error::SchedulerError;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires at least 6 fields: `sec min hour day-of-month month
/// day-of-week [year]`. Standard crontab lines use 5 fields starting at minutes.
pub fn normalize_cron(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        // Already 6/7-field or non-standard; the parser decides.
        trimmed.to_string()
    }
}

/// Fires whenever the wall clock passes the next cron occurrence.
///
/// The tick count handed back to the timer is only a hint for when to look
/// again: it is clamped to `[1, cap]`, so the entry never fires twice in one
/// tick and is re-examined at least every `cap` ticks even if wall time and
/// tick time drift apart.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    pattern: String,
    schedule: ::cron::Schedule,
    cap: i64,
    tick_interval: Duration,
    next_start: Option<DateTime<Utc>>,
    next_tick: i64,
}

impl CronSchedule {
    pub fn parse(
        pattern: &str,
        cap: i64,
        tick_interval: Duration,
        tick: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        let normalized = normalize_cron(pattern);
        let schedule = ::cron::Schedule::from_str(&normalized).map_err(|source| {
            SchedulerError::InvalidCron {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        let next_start = schedule
            .after(&now)
            .next()
            .ok_or_else(|| SchedulerError::CronExhausted(pattern.to_string()))?;

        let mut cron = Self {
            pattern: normalized,
            schedule,
            cap: cap.max(1),
            tick_interval: if tick_interval.is_zero() {
                Duration::from_millis(1)
            } else {
                tick_interval
            },
            next_start: Some(next_start),
            next_tick: 0,
        };
        cron.next_tick = tick.saturating_add(cron.ticks_until(next_start, now));
        Ok(cron)
    }

    /// The normalized expression.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn next_tick(&self) -> i64 {
        self.next_tick
    }

    pub fn next_start(&self) -> Option<DateTime<Utc>> {
        self.next_start
    }

    /// Next occurrence strictly after `at`, straight from the cron engine.
    pub fn next_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&at).next()
    }

    /// `round((target - now) / tick_interval)` clamped into `[1, cap]`.
    fn ticks_until(&self, target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
        let interval = self.tick_interval.as_nanos().max(1);
        let ticks = (remaining.as_nanos() + interval / 2) / interval;
        (ticks.min(self.cap as u128) as i64).clamp(1, self.cap)
    }

    pub(super) fn cal_next(&self, tick: i64, now: DateTime<Utc>) -> Advance {
        let Some(start) = self.next_start else {
            return Advance {
                due: false,
                next_tick: tick.saturating_add(self.cap),
                next_start: None,
                exhausted: true,
            };
        };

        if now >= start {
            let next_start = self.next_after(now);
            return Advance {
                due: true,
                next_tick: match next_start {
                    Some(next) => tick.saturating_add(self.ticks_until(next, now)),
                    None => tick.saturating_add(self.cap),
                },
                next_start,
                exhausted: next_start.is_none(),
            };
        }

        // Not yet due. Ask the engine again so a wall clock that moved
        // backwards does not leave us waiting for a stale occurrence.
        let start = match self.next_after(now) {
            Some(fresh) if fresh < start => fresh,
            _ => start,
        };
        Advance {
            due: false,
            next_tick: tick.saturating_add(self.ticks_until(start, now)),
            next_start: Some(start),
            exhausted: false,
        }
    }

    pub(super) fn check(&mut self, tick: i64, now: DateTime<Utc>) -> Advance {
        let advance = self.cal_next(tick, now);
        self.next_tick = advance.next_tick;
        self.next_start = advance.next_start;
        advance
    }
}
