use std::{fmt, str::FromStr, sync::Arc};

use serde::Serialize;

use crate::{
    clock::ClockTime,
    error::ConfigError,
    schedule::{sanitize_hours, ScheduleConfig},
    sensor::{Reading, SensorSource},
    time_window::format_clock,
    trigger::{TriggerDirection, TriggerKind},
};

/// Identifies a controlled device. Outlets are numbered from 1 as on the relay board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Outlet(usize),
    Door,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outlet(number) => write!(f, "outlet{number}"),
            Self::Door => f.write_str("door"),
        }
    }
}

impl FromStr for DeviceId {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_ascii_lowercase();
        if lower == "door" {
            return Ok(Self::Door);
        }
        lower
            .strip_prefix("outlet")
            .map(|rest| rest.trim_start_matches(['_', '-']))
            .and_then(|rest| rest.parse::<usize>().ok())
            .filter(|number| *number > 0)
            .map(Self::Outlet)
            .ok_or_else(|| ConfigError::UnknownDevice(value.to_string()))
    }
}

/// A configurable field, as named by the command surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    Enabled,
    OnTime,
    OffTime,
    Threshold,
    Direction,
    Combinator,
}

impl FromStr for SettingField {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "enabled" | "enable" => Ok(Self::Enabled),
            "on-time" | "open-time" => Ok(Self::OnTime),
            "off-time" | "close-time" => Ok(Self::OffTime),
            "threshold" => Ok(Self::Threshold),
            "direction" => Ok(Self::Direction),
            "combinator" | "and-or" => Ok(Self::Combinator),
            _ => Err(ConfigError::UnknownField(value.to_string())),
        }
    }
}

pub struct DeviceController {
    id: DeviceId,
    name: String,
    kind: TriggerKind,
    config: ScheduleConfig,
    sensor: Arc<dyn SensorSource>,
}

impl fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeviceController {
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        kind: TriggerKind,
        sensor: Arc<dyn SensorSource>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            config: ScheduleConfig::new(kind),
            sensor,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Replaces the whole config, e.g. from a persisted snapshot.
    pub fn load_config(&mut self, mut config: ScheduleConfig) {
        config.sanitize(self.kind);
        self.config = config;
    }

    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        replace(&mut self.config.enabled, enabled)
    }

    pub fn set_on_time(&mut self, hours: f32) -> Result<bool, ConfigError> {
        let hours = finite("on_time", hours)?;
        Ok(replace_f32(&mut self.config.on_time, sanitize_hours(hours)))
    }

    pub fn set_off_time(&mut self, hours: f32) -> Result<bool, ConfigError> {
        let hours = finite("off_time", hours)?;
        Ok(replace_f32(&mut self.config.off_time, sanitize_hours(hours)))
    }

    pub fn set_trigger_threshold(&mut self, threshold: f32) -> Result<bool, ConfigError> {
        let threshold = finite("threshold", threshold)?;
        Ok(replace_f32(
            &mut self.config.trigger_threshold,
            self.kind.clamp(threshold),
        ))
    }

    pub fn set_trigger_direction(&mut self, direction: TriggerDirection) -> bool {
        replace(&mut self.config.trigger_direction, direction)
    }

    pub fn set_combinator(&mut self, combine_with_and: bool) -> bool {
        replace(&mut self.config.combine_with_and, combine_with_and)
    }

    /// Parses a textual command value and routes it to the matching setter.
    pub fn apply(&mut self, field: SettingField, raw: &str) -> Result<bool, ConfigError> {
        match field {
            SettingField::Enabled => Ok(self.set_enabled(parse_switch("enabled", raw)?)),
            SettingField::OnTime => self.set_on_time(parse_number("on_time", raw)?),
            SettingField::OffTime => self.set_off_time(parse_number("off_time", raw)?),
            SettingField::Threshold => self.set_trigger_threshold(parse_number("threshold", raw)?),
            SettingField::Direction => Ok(self.set_trigger_direction(raw.parse()?)),
            SettingField::Combinator => Ok(self.set_combinator(parse_combinator(raw)?)),
        }
    }

    /// Live evaluation; may block on the sensor.
    pub fn demand(&self, now: ClockTime) -> bool {
        self.config
            .decide(now.hours(), || self.sensor.read_live())
    }

    /// Cached evaluation for display; never performs I/O.
    pub fn state(&self, now: ClockTime) -> bool {
        self.config
            .decide(now.hours(), || self.sensor.read_cached())
    }

    pub fn cached_reading(&self) -> Reading {
        self.sensor.read_cached()
    }

    pub fn view(&self, now: ClockTime) -> DeviceView {
        let reading = self.cached_reading();
        DeviceView {
            id: self.id.to_string(),
            name: self.name.clone(),
            trigger_kind: self.kind,
            config: self.config,
            window: self.config.window_kind().as_str(),
            on_label: format_clock(self.config.on_time),
            off_label: format_clock(self.config.off_time),
            threshold_label: self.kind.format_threshold(self.config.trigger_threshold),
            reading: reading.is_finite().then_some(reading),
            state: self.state(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    #[serde(rename = "triggerKind")]
    pub trigger_kind: TriggerKind,
    pub config: ScheduleConfig,
    pub window: &'static str,
    #[serde(rename = "onLabel")]
    pub on_label: String,
    #[serde(rename = "offLabel")]
    pub off_label: String,
    #[serde(rename = "thresholdLabel")]
    pub threshold_label: String,
    pub reading: Option<f32>,
    pub state: bool,
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}

fn replace_f32(slot: &mut f32, value: f32) -> bool {
    if (*slot - value).abs() > f32::EPSILON {
        *slot = value;
        true
    } else {
        false
    }
}

fn finite(field: &'static str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<f32, ConfigError> {
    raw.trim()
        .parse::<f32>()
        .map_err(|_| ConfigError::InvalidValue {
            field,
            value: raw.to_string(),
        })
}

fn parse_switch(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            value: raw.to_string(),
        }),
    }
}

fn parse_combinator(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "AND" => Ok(true),
        "OR" => Ok(false),
        _ => parse_switch("combinator", raw),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::sensor::FixedSensor;

    struct CountingSensor {
        live: AtomicU32,
        cached: AtomicU32,
        value: Reading,
    }

    impl CountingSensor {
        fn new(value: Reading) -> Arc<Self> {
            Arc::new(Self {
                live: AtomicU32::new(0),
                cached: AtomicU32::new(0),
                value,
            })
        }
    }

    impl SensorSource for CountingSensor {
        fn read_live(&self) -> Reading {
            self.live.fetch_add(1, Ordering::Relaxed);
            self.value
        }

        fn read_cached(&self) -> Reading {
            self.cached.fetch_add(1, Ordering::Relaxed);
            self.value
        }
    }

    struct PanickingLiveSensor;

    impl SensorSource for PanickingLiveSensor {
        fn read_live(&self) -> Reading {
            panic!("live read");
        }

        fn read_cached(&self) -> Reading {
            panic!("cached read");
        }
    }

    fn outlet(sensor: Arc<dyn SensorSource>) -> DeviceController {
        DeviceController::new(DeviceId::Outlet(1), "Heat Lamp", TriggerKind::Temperature, sensor)
    }

    #[test]
    fn disabled_device_does_not_touch_sensor() {
        let mut device = outlet(Arc::new(PanickingLiveSensor));
        device.set_trigger_direction(TriggerDirection::ActivateBelow);
        device.set_on_time(0.0).unwrap();
        device.set_off_time(0.0).unwrap();

        assert!(!device.demand(ClockTime::new(8, 0, 0)));
        assert!(!device.state(ClockTime::new(8, 0, 0)));
    }

    #[test]
    fn demand_reads_live_and_state_reads_cache() {
        let sensor = CountingSensor::new(30.0);
        let mut device = outlet(sensor.clone());
        device.set_enabled(true);
        device.set_trigger_direction(TriggerDirection::ActivateBelow);

        let now = ClockTime::new(9, 0, 0);
        assert!(device.demand(now));
        assert!(device.state(now));

        assert_eq!(sensor.live.load(Ordering::Relaxed), 1);
        assert_eq!(sensor.cached.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn live_and_cached_can_disagree() {
        let sensor = Arc::new(FixedSensor {
            live: 35.0,
            cached: 45.0,
        });
        let mut device = outlet(sensor);
        device.set_enabled(true);
        device.set_on_time(18.0).unwrap();
        device.set_off_time(6.0).unwrap();
        device.set_trigger_threshold(40.0).unwrap();
        device.set_trigger_direction(TriggerDirection::ActivateBelow);
        device.set_combinator(true);

        let now = ClockTime::new(20, 0, 0);
        assert!(device.demand(now));
        assert!(!device.state(now));
    }

    #[test]
    fn repeated_evaluation_is_stable() {
        let mut device = outlet(Arc::new(FixedSensor::new(55.0)));
        device.set_enabled(true);
        device.set_on_time(6.0).unwrap();
        device.set_off_time(22.0).unwrap();
        device.set_trigger_direction(TriggerDirection::ActivateAbove);
        device.set_combinator(true);

        let now = ClockTime::new(12, 30, 0);
        let first = device.demand(now);
        let cached = device.state(now);
        for _ in 0..10 {
            assert_eq!(device.demand(now), first);
            assert_eq!(device.state(now), cached);
        }
    }

    #[test]
    fn setters_clamp_and_reject() {
        let mut device = outlet(Arc::new(FixedSensor::absent()));

        assert_eq!(device.set_on_time(30.0), Ok(true));
        assert_eq!(device.config().on_time, 24.0);
        assert_eq!(device.set_off_time(-1.0), Ok(true));
        assert_eq!(device.config().off_time, 0.0);
        assert_eq!(device.set_trigger_threshold(500.0), Ok(true));
        assert_eq!(device.config().trigger_threshold, 150.0);

        let before = *device.config();
        assert!(matches!(
            device.set_on_time(f32::NAN),
            Err(ConfigError::NotFinite { field: "on_time", .. })
        ));
        assert!(device.set_trigger_threshold(f32::INFINITY).is_err());
        assert_eq!(*device.config(), before);

        assert_eq!(device.set_on_time(24.0), Ok(false));
        assert!(!device.set_enabled(false));
    }

    #[test]
    fn door_threshold_uses_light_domain() {
        let mut door = DeviceController::new(
            DeviceId::Door,
            "Door",
            TriggerKind::Light,
            Arc::new(FixedSensor::absent()),
        );
        assert_eq!(door.config().trigger_threshold, 2.65);
        door.set_trigger_threshold(9.0).unwrap();
        assert_eq!(door.config().trigger_threshold, 5.0);
    }

    #[test]
    fn textual_commands() {
        let mut device = outlet(Arc::new(FixedSensor::absent()));

        assert_eq!(device.apply(SettingField::Enabled, "on"), Ok(true));
        assert_eq!(device.apply(SettingField::OnTime, "18.5"), Ok(true));
        assert_eq!(device.apply(SettingField::Direction, "below"), Ok(true));
        assert_eq!(device.apply(SettingField::Combinator, "AND"), Ok(true));
        assert_eq!(device.apply(SettingField::Threshold, "35"), Ok(true));

        let config = device.config();
        assert!(config.enabled);
        assert_eq!(config.on_time, 18.5);
        assert_eq!(config.trigger_direction, TriggerDirection::ActivateBelow);
        assert!(config.combine_with_and);
        assert_eq!(config.trigger_threshold, 35.0);

        assert!(device.apply(SettingField::OffTime, "noon").is_err());
        assert!(device.apply(SettingField::Enabled, "maybe").is_err());
    }

    #[test]
    fn parses_ids_and_fields() {
        assert_eq!("outlet3".parse::<DeviceId>(), Ok(DeviceId::Outlet(3)));
        assert_eq!("Outlet_2".parse::<DeviceId>(), Ok(DeviceId::Outlet(2)));
        assert_eq!("door".parse::<DeviceId>(), Ok(DeviceId::Door));
        assert!("outlet0".parse::<DeviceId>().is_err());
        assert!("gate".parse::<DeviceId>().is_err());
        assert_eq!(DeviceId::Outlet(4).to_string(), "outlet4");

        assert_eq!("on_time".parse::<SettingField>(), Ok(SettingField::OnTime));
        assert_eq!("close-time".parse::<SettingField>(), Ok(SettingField::OffTime));
        assert!("color".parse::<SettingField>().is_err());
    }
}
