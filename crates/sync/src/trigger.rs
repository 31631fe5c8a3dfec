#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

/// Coalesces bursts of local mutations into one sync trigger after a quiet
/// period. Pure state machine over caller-supplied instants — the engine
/// never spawns worker threads, so the caller decides when to poll.
#[derive(Debug)]
pub struct DebouncedTrigger {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl DebouncedTrigger {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Records a local mutation; edits inside the quiet window collapse
    /// into one pending trigger.
    pub fn note_change(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Consumes the trigger if it is due. Returns whether the caller should
    /// run a sync round.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.due(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }

    /// Forces the pending trigger to fire immediately on the next poll.
    pub fn flush(&mut self, now: Instant) {
        if self.deadline.is_some() {
            self.deadline = Some(now);
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// Fixed-cadence auto-sync marker; the same caller-polled style as
/// `DebouncedTrigger`. The single-flight guard and network gate still apply
/// inside the engine when the timer fires.
#[derive(Debug)]
pub struct PeriodicTimer {
    interval: Duration,
    last_run: Option<Instant>,
}

impl PeriodicTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now >= last + self.interval,
        }
    }

    pub fn mark_ran(&mut self, now: Instant) {
        self.last_run = Some(now);
    }
}
