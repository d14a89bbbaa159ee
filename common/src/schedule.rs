use serde::{Deserialize, Serialize};

use crate::{
    sensor::Reading,
    time_window::{TimeWindow, TimeWindowKind},
    trigger::{TriggerDirection, TriggerKind},
};

pub const NOON: f32 = 12.0;

/// One device's schedule: a daily time window, an optional sensor trigger and
/// how the two combine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    #[serde(rename = "onTime")]
    pub on_time: f32,
    #[serde(rename = "offTime")]
    pub off_time: f32,
    #[serde(rename = "triggerDirection")]
    pub trigger_direction: TriggerDirection,
    #[serde(rename = "triggerThreshold")]
    pub trigger_threshold: f32,
    #[serde(rename = "combineWithAnd")]
    pub combine_with_and: bool,
}

impl ScheduleConfig {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            enabled: false,
            on_time: NOON,
            off_time: NOON,
            trigger_direction: TriggerDirection::Independent,
            trigger_threshold: kind.default_threshold(),
            combine_with_and: false,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.on_time, self.off_time)
    }

    pub fn window_kind(&self) -> TimeWindowKind {
        self.window().kind()
    }

    /// Whether the device should be energized at `now_hours`.
    ///
    /// `reading` is only invoked when the device is enabled and its trigger
    /// participates, so a disabled or time-only device never touches its
    /// sensor.
    pub fn decide<F>(&self, now_hours: f32, reading: F) -> bool
    where
        F: FnOnce() -> Reading,
    {
        if !self.enabled {
            return false;
        }

        let time_on = self.window().is_on(now_hours);
        if self.trigger_direction == TriggerDirection::Independent {
            return time_on;
        }

        match self
            .trigger_direction
            .evaluate(self.trigger_threshold, reading())
        {
            None => time_on,
            Some(trigger) if self.combine_with_and => time_on && trigger,
            Some(trigger) => time_on || trigger,
        }
    }

    /// Brings a config loaded from disk back into its domain.
    pub fn sanitize(&mut self, kind: TriggerKind) {
        self.on_time = sanitize_hours(self.on_time);
        self.off_time = sanitize_hours(self.off_time);
        self.trigger_threshold = if self.trigger_threshold.is_finite() {
            kind.clamp(self.trigger_threshold)
        } else {
            kind.default_threshold()
        };
    }
}

pub(crate) fn sanitize_hours(hours: f32) -> f32 {
    if hours.is_finite() {
        hours.clamp(0.0, 24.0)
    } else {
        NOON
    }
}
