use std::fmt;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// Wall-clock time of day, captured once per polling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour: hour.min(23),
            minute: minute.min(59),
            second: second.min(59),
        }
    }

    pub fn from_chrono<T: Timelike>(time: &T) -> Self {
        Self::new(time.hour() as u8, time.minute() as u8, time.second() as u8)
    }

    /// Continuous hours in [0, 24).
    pub fn hours(self) -> f32 {
        self.hour as f32 + self.minute as f32 / 60.0 + self.second as f32 / 3600.0
    }

    pub fn seconds_of_day(self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> ClockTime;
}

/// A clock that always reports the same time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub ClockTime);

impl Clock for FixedClock {
    fn now(&self) -> ClockTime {
        self.0
    }
}
