//! Cooperative fixed-period task scheduler.
//!
//! Each task has a period and a deadline. [`Scheduler::next_due`] hands out the most
//! overdue task and re-arms it; a task that fell more than a period behind is re-armed
//! from the current time instead of running again to catch up.

use fugit::MillisDurationU64;

use crate::{channel::Instant, error::SchedulerError, types::ChannelId};

/// Most tasks the scheduler can hold.
pub const MAX_TASKS: usize = 8;

/// Periods from here on wrap the clock arithmetic and would leave a task always due.
pub const MAX_PERIOD_MS: u64 = u64::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Regulate(ChannelId),
    Supervise,
    WatchPanel,
    ReadCommands,
    Telemetry,
    ReportState,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    task: Task,
    period: MillisDurationU64,
    deadline: Instant,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    entries: heapless::Vec<Entry, MAX_TASKS>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. It is due immediately.
    pub fn add(
        &mut self,
        task: Task,
        period: MillisDurationU64,
        now: Instant,
    ) -> Result<(), SchedulerError> {
        check_period(period)?;
        if self.entries.iter().any(|entry| entry.task == task) {
            return Err(SchedulerError::Duplicate);
        }
        self.entries
            .push(Entry {
                task,
                period,
                deadline: now,
            })
            .map_err(|_| SchedulerError::Full)
    }

    /// Take the most overdue task, if any is due, and re-arm it.
    ///
    /// Ties go to the task registered first.
    pub fn next_due(&mut self, now: Instant) -> Option<Task> {
        let mut due: Option<usize> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.deadline > now {
                continue;
            }
            if due.is_none_or(|best| entry.deadline < self.entries[best].deadline) {
                due = Some(idx);
            }
        }

        let entry = &mut self.entries[due?];
        let next = entry.deadline + entry.period;
        entry.deadline = if next > now { next } else { now + entry.period };
        Some(entry.task)
    }

    /// Change a task's period. The next run is rescheduled from its last run.
    pub fn set_period(
        &mut self,
        task: Task,
        period: MillisDurationU64,
    ) -> Result<(), SchedulerError> {
        check_period(period)?;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.task == task)
            .ok_or(SchedulerError::Unknown)?;

        if let Some(last) = entry.deadline.checked_sub_duration(entry.period) {
            entry.deadline = last + period;
        }
        entry.period = period;
        Ok(())
    }

    pub fn period(&self, task: Task) -> Option<MillisDurationU64> {
        self.entries
            .iter()
            .find(|entry| entry.task == task)
            .map(|entry| entry.period)
    }

    /// Earliest deadline of all tasks, for sleeping until then.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.deadline).min()
    }
}

fn check_period(period: MillisDurationU64) -> Result<(), SchedulerError> {
    match period.ticks() {
        0 => Err(SchedulerError::ZeroPeriod),
        ticks if ticks >= MAX_PERIOD_MS => Err(SchedulerError::PeriodTooLong),
        _ => Ok(()),
    }
}
