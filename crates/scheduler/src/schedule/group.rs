use chrono::{DateTime, Utc};

use super::{Advance, Schedule};
use crate::error::SchedulerError;
use crate::queue::PriorityQueue;

/// Several schedules behind a single timer-queue entry.
///
/// Children live in their own heap keyed by next tick; the group is due
/// whenever any child is due, and asks to be re-examined at the earliest
/// child's next tick. Many near-simultaneous schedules thus cost the outer
/// timer heap one entry instead of one each.
#[derive(Debug)]
pub struct ScheduleGroup {
    children: PriorityQueue<Schedule>,
}

impl ScheduleGroup {
    pub fn new(schedules: Vec<Schedule>) -> Result<Self, SchedulerError> {
        if schedules.is_empty() {
            return Err(SchedulerError::EmptyGroup);
        }
        let children = PriorityQueue::new();
        for schedule in schedules {
            let priority = schedule.next_tick();
            children.push(schedule, priority);
        }
        Ok(Self { children })
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn next_tick(&self) -> i64 {
        self.children.next_priority()
    }

    /// Earliest wall-clock start across children.
    pub fn next_start(&self) -> Option<DateTime<Utc>> {
        let mut earliest: Option<DateTime<Utc>> = None;
        self.children.scan(|child, _| {
            if let Some(start) = child.next_start() {
                earliest = Some(earliest.map_or(start, |e| e.min(start)));
            }
        });
        earliest
    }

    pub(super) fn cal_next(&self, tick: i64, now: DateTime<Utc>) -> Advance {
        let mut due = false;
        let mut next_tick = i64::MAX;
        let mut next_start: Option<DateTime<Utc>> = None;
        let mut live = 0usize;

        self.children.scan(|child, priority| {
            let (child_due, child_next, child_start, child_exhausted) = if priority <= tick {
                let adv = child.cal_next(tick, now);
                (adv.due, adv.next_tick, adv.next_start, adv.exhausted)
            } else {
                (false, priority, child.next_start(), false)
            };
            due |= child_due;
            if !child_exhausted {
                live += 1;
                next_tick = next_tick.min(child_next);
            }
            if let Some(start) = child_start {
                next_start = Some(next_start.map_or(start, |s| s.min(start)));
            }
        });

        Advance {
            due,
            next_tick: if live == 0 { tick.saturating_add(1) } else { next_tick },
            next_start,
            exhausted: live == 0,
        }
    }

    pub(super) fn check(&mut self, tick: i64, now: DateTime<Utc>) -> Advance {
        let mut advanced = Vec::new();
        let mut due = false;
        while let Some((mut child, _)) = self.children.pop_due(tick) {
            let adv = child.check(tick, now);
            due |= adv.due;
            if !adv.exhausted {
                advanced.push((child, adv.next_tick));
            }
        }
        for (child, next) in advanced {
            self.children.push(child, next);
        }

        let exhausted = self.children.is_empty();
        Advance {
            due,
            next_tick: if exhausted {
                tick.saturating_add(1)
            } else {
                self.children.next_priority()
            },
            next_start: self.next_start(),
            exhausted,
        }
    }
}
