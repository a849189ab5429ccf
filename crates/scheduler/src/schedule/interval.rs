use super::Advance;

/// Fires every `ticks` ticks, counted from when it was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSchedule {
    ticks: i64,
    next_ticks: i64,
}

impl IntervalSchedule {
    /// First due at `current_tick + ticks`. `ticks` is floored at one.
    pub fn new(ticks: i64, current_tick: i64) -> Self {
        let ticks = ticks.max(1);
        Self {
            ticks,
            next_ticks: current_tick.saturating_add(ticks),
        }
    }

    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    pub fn next_tick(&self) -> i64 {
        self.next_ticks
    }

    pub(super) fn cal_next(&self, tick: i64) -> Advance {
        let due = tick >= self.next_ticks;
        Advance {
            due,
            next_tick: if due {
                tick.saturating_add(self.ticks)
            } else {
                self.next_ticks
            },
            next_start: None,
            exhausted: false,
        }
    }

    pub(super) fn check(&mut self, tick: i64) -> Advance {
        let advance = self.cal_next(tick);
        self.next_ticks = advance.next_tick;
        advance
    }
}
