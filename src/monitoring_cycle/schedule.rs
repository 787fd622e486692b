//! Capture schedule on the monotonic clock
//!
//! The countdown is always `deadline - now`; pausing stores what was left
//! and resuming re-arms the deadline with exactly that.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    deadline: Option<Instant>,
    paused_remaining: Option<Duration>,
}

impl Schedule {
    /// Arm the first deadline one interval from `now`
    pub fn start(&mut self, now: Instant, interval: Duration) {
        self.deadline = Some(now + interval);
        self.paused_remaining = None;
    }

    /// Next deadline after a cycle (or a skipped one)
    pub fn reschedule(&mut self, now: Instant, interval: Duration) {
        self.start(now, interval);
    }

    /// Freeze the countdown
    pub fn pause(&mut self, now: Instant) {
        if let Some(deadline) = self.deadline.take() {
            self.paused_remaining = Some(deadline.saturating_duration_since(now));
        }
    }

    /// Continue with the time that was left at pause
    pub fn resume(&mut self, now: Instant) {
        if let Some(remaining) = self.paused_remaining.take() {
            self.deadline = Some(now + remaining);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Armed deadline, `None` while paused or stopped
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the next capture
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.deadline, self.paused_remaining) {
            (Some(deadline), _) => Some(deadline.saturating_duration_since(now)),
            (None, Some(remaining)) => Some(remaining),
            (None, None) => None,
        }
    }

    /// Whole seconds left, rounded up, never negative
    pub fn countdown_seconds(&self, now: Instant) -> u64 {
        self.remaining(now)
            .map(|d| {
                let millis = d.as_millis() as u64;
                millis.div_ceil(1000)
            })
            .unwrap_or(0)
    }
}
