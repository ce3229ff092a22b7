//! Pick window evaluation.
//!
//! Pure functions of the current time and an event's lock instant. They must
//! be re-evaluated on every poll: the window can close while a session is
//! open.

use crate::models::Event;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::fmt;

/// Source of "now". Injected everywhere a decision depends on time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Whether picks may be written. The lock instant itself is already locked.
pub fn can_write(event: &Event, now: DateTime<Utc>) -> bool {
    now < event.lock_at
}

pub fn is_event_over(event: &Event, now: DateTime<Utc>) -> bool {
    now > event.end_at
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUntilLock {
    Open(Duration),
    Locked,
}

impl TimeUntilLock {
    pub fn is_locked(&self) -> bool {
        matches!(self, TimeUntilLock::Locked)
    }
}

impl fmt::Display for TimeUntilLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUntilLock::Locked => write!(f, "locked"),
            TimeUntilLock::Open(remaining) => {
                let days = remaining.num_days();
                let hours = remaining.num_hours() % 24;
                let minutes = remaining.num_minutes() % 60;

                if days > 0 {
                    write!(f, "{}d {}h {}m", days, hours, minutes)
                } else if hours > 0 {
                    write!(f, "{}h {}m", hours, minutes)
                } else {
                    write!(f, "{}m", minutes)
                }
            }
        }
    }
}

pub fn time_until_lock(event: &Event, now: DateTime<Utc>) -> TimeUntilLock {
    if !can_write(event, now) {
        return TimeUntilLock::Locked;
    }
    TimeUntilLock::Open(event.lock_at - now)
}

/// Window state as seen by a session. Only ever moves Open -> Locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Open,
    Locked,
}

impl WindowStatus {
    pub fn evaluate(event: &Event, now: DateTime<Utc>) -> Self {
        if can_write(event, now) {
            WindowStatus::Open
        } else {
            WindowStatus::Locked
        }
    }

    /// Combine with a fresh evaluation; never loosens.
    pub fn tighten(self, observed: WindowStatus) -> WindowStatus {
        match (self, observed) {
            (WindowStatus::Locked, _) | (_, WindowStatus::Locked) => WindowStatus::Locked,
            _ => WindowStatus::Open,
        }
    }
}
