//! Deferred and periodic work of the supervisor.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::models::constants::SUPERVISOR_MODULE;

use super::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timer {
    /// Periodic reconcile pass.
    Tick,
    /// Next close orchestration pass.
    CloseRetry,
    Reinitialize,
    /// Re-enable auto-start modules closed by `close_module`.
    CheckAutoStart,
    /// Memory sample shortly after a module start.
    MemorySample,
    /// Periodic memory report.
    MemoryReport,
    /// Forget the click sequence.
    ClearClicks,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    due: Instant,
    period: Option<Duration>,
}

/// Timers keyed by kind. Scheduling a kind again replaces the pending one.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: BTreeMap<Timer, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_once(&mut self, timer: Timer, delay: Duration, now: Instant) {
        self.entries.insert(
            timer,
            Entry {
                due: now + delay,
                period: None,
            },
        );
    }

    pub fn schedule_repeating(&mut self, timer: Timer, period: Duration, now: Instant) {
        self.entries.insert(
            timer,
            Entry {
                due: now + period,
                period: Some(period),
            },
        );
    }

    pub fn cancel(&mut self, timer: Timer) {
        self.entries.remove(&timer);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_active(&self, timer: Timer) -> bool {
        self.entries.contains_key(&timer)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|entry| entry.due).min()
    }

    /// Remove and return the earliest timer due at `now`. Repeating timers are
    /// rescheduled one period later, never in the past.
    pub fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        let (&timer, &entry) = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.due <= now)
            .min_by_key(|(_, entry)| entry.due)?;

        match entry.period {
            Some(period) => {
                let mut due = entry.due + period;
                if due <= now {
                    due = now + period;
                }
                self.entries.insert(timer, Entry { due, ..entry });
            }
            None => {
                self.entries.remove(&timer);
            }
        }
        Some(timer)
    }
}

impl Supervisor {
    /// Run every timer that is due.
    pub fn fire_due_timers(&mut self) {
        let now = self.instant();
        while let Some(timer) = self.timers.pop_due(now) {
            self.on_timer(timer);
        }
    }

    /// Time until the next timer is due, `None` when nothing is scheduled.
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        self.timers
            .next_deadline()
            .map(|due| due.saturating_duration_since(self.instant()))
    }

    pub fn timer_active(&self, timer: Timer) -> bool {
        self.timers.is_active(timer)
    }

    pub fn on_timer(&mut self, timer: Timer) {
        tracing::trace!("Timer {timer:?} fired");
        match timer {
            Timer::Tick => self.reconcile(),
            Timer::CloseRetry => self.close_modules(SUPERVISOR_MODULE),
            Timer::Reinitialize => self.reinitialize(),
            Timer::CheckAutoStart => self.check_auto_start_modules(),
            Timer::MemorySample | Timer::MemoryReport => self.check_process_memory(),
            Timer::ClearClicks => self.clicks.clear(),
        }
    }

    pub(super) fn schedule_once(&mut self, timer: Timer, delay: Duration) {
        let now = self.instant();
        self.timers.schedule_once(timer, delay, now);
    }

    pub(super) fn schedule_repeating(&mut self, timer: Timer, period: Duration) {
        let now = self.instant();
        self.timers.schedule_repeating(timer, period, now);
    }
}
