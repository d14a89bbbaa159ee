use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, sensor::Reading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerDirection {
    #[default]
    Independent,
    ActivateAbove,
    ActivateBelow,
}

impl TriggerDirection {
    /// `None` means the trigger has no opinion and the time window decides alone.
    pub fn evaluate(self, threshold: f32, reading: Reading) -> Option<bool> {
        match self {
            Self::Independent => None,
            Self::ActivateAbove => Some(reading > threshold),
            Self::ActivateBelow => Some(reading < threshold),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Independent => "INDEPENDENT",
            Self::ActivateAbove => "ACTIVATE_ABOVE",
            Self::ActivateBelow => "ACTIVATE_BELOW",
        }
    }

    /// Integer code used by the legacy settings file: 0, 1 (above), -1 (below).
    pub fn code(self) -> i8 {
        match self {
            Self::Independent => 0,
            Self::ActivateAbove => 1,
            Self::ActivateBelow => -1,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::Independent),
            1 => Some(Self::ActivateAbove),
            -1 => Some(Self::ActivateBelow),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerDirection {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let upper = value.trim().to_ascii_uppercase();
        match upper.as_str() {
            "INDEPENDENT" | "NONE" => Ok(Self::Independent),
            "ABOVE" | "ACTIVATE_ABOVE" => Ok(Self::ActivateAbove),
            "BELOW" | "ACTIVATE_BELOW" => Ok(Self::ActivateBelow),
            _ => upper
                .parse::<i8>()
                .ok()
                .and_then(Self::from_code)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "direction",
                    value: value.to_string(),
                }),
        }
    }
}

/// What a device's trigger threshold measures, which fixes its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// Degrees Fahrenheit.
    Temperature,
    /// log10 of illuminance in lux.
    Light,
}

impl TriggerKind {
    pub fn domain(self) -> (f32, f32) {
        match self {
            Self::Temperature => (-40.0, 150.0),
            Self::Light => (0.0, 5.0),
        }
    }

    pub fn default_threshold(self) -> f32 {
        match self {
            Self::Temperature => 50.0,
            Self::Light => 2.65,
        }
    }

    pub fn clamp(self, threshold: f32) -> f32 {
        let (min, max) = self.domain();
        threshold.clamp(min, max)
    }

    /// Human readable threshold, e.g. `"50°F"` or `"3,200 lux"`.
    pub fn format_threshold(self, threshold: f32) -> String {
        match self {
            Self::Temperature => format!("{}°F", threshold.round() as i32),
            Self::Light => {
                let lux = 10f32.powf(threshold);
                let rounded = if lux < 1000.0 {
                    (lux / 10.0).round() * 10.0
                } else {
                    (lux / 100.0).round() * 100.0
                };
                format!("{} lux", group_thousands(rounded as u64))
            }
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::NO_READING;

    #[test]
    fn independent_has_no_opinion() {
        assert_eq!(TriggerDirection::Independent.evaluate(40.0, 10.0), None);
        assert_eq!(TriggerDirection::Independent.evaluate(40.0, 90.0), None);
    }

    #[test]
    fn above_and_below_are_strict() {
        assert_eq!(TriggerDirection::ActivateAbove.evaluate(40.0, 41.0), Some(true));
        assert_eq!(TriggerDirection::ActivateAbove.evaluate(40.0, 40.0), Some(false));
        assert_eq!(TriggerDirection::ActivateBelow.evaluate(40.0, 39.0), Some(true));
        assert_eq!(TriggerDirection::ActivateBelow.evaluate(40.0, 40.0), Some(false));
    }

    #[test]
    fn missing_reading_never_fires() {
        assert_eq!(
            TriggerDirection::ActivateAbove.evaluate(40.0, NO_READING),
            Some(false)
        );
        assert_eq!(
            TriggerDirection::ActivateBelow.evaluate(40.0, NO_READING),
            Some(false)
        );
    }

    #[test]
    fn parses_names_and_legacy_codes() {
        assert_eq!("above".parse::<TriggerDirection>(), Ok(TriggerDirection::ActivateAbove));
        assert_eq!("BELOW".parse::<TriggerDirection>(), Ok(TriggerDirection::ActivateBelow));
        assert_eq!("-1".parse::<TriggerDirection>(), Ok(TriggerDirection::ActivateBelow));
        assert_eq!("0".parse::<TriggerDirection>(), Ok(TriggerDirection::Independent));
        assert!("sideways".parse::<TriggerDirection>().is_err());

        for direction in [
            TriggerDirection::Independent,
            TriggerDirection::ActivateAbove,
            TriggerDirection::ActivateBelow,
        ] {
            assert_eq!(TriggerDirection::from_code(direction.code()), Some(direction));
        }
    }

    #[test]
    fn light_threshold_label_rounds() {
        assert_eq!(TriggerKind::Light.format_threshold(2.65), "450 lux");
        assert_eq!(TriggerKind::Light.format_threshold(3.5), "3,200 lux");
        assert_eq!(TriggerKind::Light.format_threshold(5.0), "100,000 lux");
        assert_eq!(TriggerKind::Light.format_threshold(0.0), "0 lux");
        assert_eq!(TriggerKind::Temperature.format_threshold(49.6), "50°F");
    }

    #[test]
    fn label_matches_serialized_name() {
        for direction in [
            TriggerDirection::Independent,
            TriggerDirection::ActivateAbove,
            TriggerDirection::ActivateBelow,
        ] {
            let json = serde_json::to_string(&direction).unwrap();
            assert_eq!(json, format!("\"{direction}\""));
            assert_eq!(direction.as_str().parse::<TriggerDirection>(), Ok(direction));
        }
    }
}
