use serde::{Deserialize, Serialize};

/// How an on/off pair maps the cyclic day onto the 0-24 hour line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeWindowKind {
    /// On time equals off time (or they are a full day apart).
    AlwaysOn,
    /// On through midnight, off during a daytime gap.
    OnOffOn,
    /// Off through midnight, on during a daytime interval.
    OffOnOff,
}

impl TimeWindowKind {
    pub fn classify(on_time: f32, off_time: f32) -> Self {
        if on_time == off_time || (on_time - off_time).abs() == 24.0 {
            Self::AlwaysOn
        } else if on_time > off_time {
            Self::OnOffOn
        } else {
            Self::OffOnOff
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysOn => "ALWAYS_ON",
            Self::OnOffOn => "ON_OFF_ON",
            Self::OffOnOff => "OFF_ON_OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub on_time: f32,
    pub off_time: f32,
}

impl TimeWindow {
    pub fn new(on_time: f32, off_time: f32) -> Self {
        Self { on_time, off_time }
    }

    pub fn kind(&self) -> TimeWindowKind {
        TimeWindowKind::classify(self.on_time, self.off_time)
    }

    /// Intervals are half-open and lower-inclusive: a device is on at exactly
    /// its on time and off at exactly its off time.
    pub fn is_on(&self, now_hours: f32) -> bool {
        match self.kind() {
            TimeWindowKind::AlwaysOn => true,
            TimeWindowKind::OnOffOn => !(self.off_time <= now_hours && now_hours < self.on_time),
            TimeWindowKind::OffOnOff => self.on_time <= now_hours && now_hours < self.off_time,
        }
    }
}

/// Renders fractional hours as a 12-hour clock label, e.g. `6.25` -> `"6:15 AM"`.
pub fn format_clock(hours: f32) -> String {
    let total_minutes = (hours.clamp(0.0, 24.0) * 60.0).round() as u32;
    let hour = (total_minutes / 60) % 24;
    let minute = total_minutes % 60;
    let suffix = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hour}:{minute:02} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> impl Iterator<Item = f32> {
        (0..24 * 60).map(|minute| minute as f32 / 60.0)
    }

    #[test]
    fn equal_or_full_day_apart_is_always_on() {
        for (on, off) in [(0.0, 0.0), (12.0, 12.0), (7.5, 7.5), (0.0, 24.0), (24.0, 0.0)] {
            let window = TimeWindow::new(on, off);
            assert_eq!(window.kind(), TimeWindowKind::AlwaysOn);
            assert!(sweep().all(|now| window.is_on(now)), "{on} -> {off}");
        }
    }

    #[test]
    fn overnight_window_is_off_only_in_daytime_gap() {
        let window = TimeWindow::new(22.0, 6.0);
        assert_eq!(window.kind(), TimeWindowKind::OnOffOn);

        assert!(window.is_on(23.0));
        assert!(window.is_on(2.0));
        assert!(window.is_on(0.0));
        assert!(!window.is_on(6.0));
        assert!(!window.is_on(10.0));
        assert!(!window.is_on(21.9));
        assert!(!window.is_on(21.999));
        assert!(window.is_on(22.0));
    }

    #[test]
    fn daytime_window_is_on_only_inside_interval() {
        let window = TimeWindow::new(6.0, 22.0);
        assert_eq!(window.kind(), TimeWindowKind::OffOnOff);

        assert!(window.is_on(6.0));
        assert!(window.is_on(21.9));
        assert!(!window.is_on(22.0));
        assert!(!window.is_on(5.9));
        assert!(!window.is_on(23.5));
    }

    #[test]
    fn clock_labels() {
        assert_eq!(format_clock(0.0), "12:00 AM");
        assert_eq!(format_clock(6.25), "6:15 AM");
        assert_eq!(format_clock(12.0), "12:00 PM");
        assert_eq!(format_clock(18.75), "6:45 PM");
        assert_eq!(format_clock(24.0), "12:00 AM");
    }
}
