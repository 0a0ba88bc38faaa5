//! Expiration times: the deadline-based priority encoding used by every update.
//!
//! Lower values are more urgent. A pass rendering at time `R` processes every
//! update whose expiration is `<= R`, so updates sharing a timestamp coalesce
//! into one pass and distinct timestamps are processed in ascending order.

use std::fmt;

use crate::platform::SchedulerPriority;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpirationTime(u64);

impl ExpirationTime {
    /// Must be committed in the current turn.
    pub const SYNC: ExpirationTime = ExpirationTime(0);
    pub const IDLE: ExpirationTime = ExpirationTime(u64::MAX - 1);
    /// No pending work.
    pub const NO_WORK: ExpirationTime = ExpirationTime(u64::MAX);

    pub const fn from_millis(millis: u64) -> Self {
        ExpirationTime(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Expiration for an update requested at `now` under `priority`.
    pub fn compute(now: u64, priority: SchedulerPriority) -> Self {
        match priority.timeout_millis() {
            Some(0) => ExpirationTime::SYNC,
            Some(timeout) => ExpirationTime(now.saturating_add(timeout).clamp(1, u64::MAX - 2)),
            None => ExpirationTime::IDLE,
        }
    }

    pub fn is_sync(self) -> bool {
        self == ExpirationTime::SYNC
    }

    pub fn is_no_work(self) -> bool {
        self == ExpirationTime::NO_WORK
    }

    /// `true` when a pass rendering at `self` must process work expiring at `other`.
    pub fn includes(self, other: ExpirationTime) -> bool {
        !other.is_no_work() && other <= self
    }

    pub fn more_urgent(self, other: ExpirationTime) -> ExpirationTime {
        self.min(other)
    }

    pub fn less_urgent(self, other: ExpirationTime) -> ExpirationTime {
        self.max(other)
    }

    /// Whether the deadline has already passed at `now`.
    pub fn has_expired(self, now: u64) -> bool {
        self != ExpirationTime::NO_WORK && self != ExpirationTime::IDLE && self.0 <= now
    }

    /// Scheduler priority for work that expires at `self`, observed at `now`.
    pub fn priority_at(self, now: u64) -> SchedulerPriority {
        if self.is_sync() {
            return SchedulerPriority::Immediate;
        }
        if self >= ExpirationTime::IDLE {
            return SchedulerPriority::Idle;
        }
        let remaining = self.0.saturating_sub(now);
        SchedulerPriority::ALL
            .into_iter()
            .find(|priority| match priority.timeout_millis() {
                Some(timeout) => remaining <= timeout,
                None => true,
            })
            .unwrap_or(SchedulerPriority::Idle)
    }
}

impl fmt::Debug for ExpirationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ExpirationTime::SYNC => f.write_str("Sync"),
            ExpirationTime::IDLE => f.write_str("Idle"),
            ExpirationTime::NO_WORK => f.write_str("NoWork"),
            ExpirationTime(millis) => write!(f, "Expires({millis}ms)"),
        }
    }
}

#[cfg(test)]
#[path = "tests/expiration_tests.rs"]
mod tests;
