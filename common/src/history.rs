use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{error::PersistenceError, sensor::Reading};

/// One periodic record of readings and actuator states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Readings by channel name; `None` when the sensor has no value yet.
    pub readings: BTreeMap<String, Option<f32>>,
    pub outlets: Vec<bool>,
    #[serde(rename = "doorOpen")]
    pub door_open: bool,
}

impl HistoryRow {
    pub fn new(timestamp: i64, outlets: Vec<bool>, door_open: bool) -> Self {
        Self {
            timestamp,
            readings: BTreeMap::new(),
            outlets,
            door_open,
        }
    }

    pub fn with_reading(mut self, channel: impl Into<String>, reading: Reading) -> Self {
        self.readings
            .insert(channel.into(), reading.is_finite().then_some(reading));
        self
    }

    pub fn reading(&self, channel: &str) -> Option<f32> {
        self.readings.get(channel).copied().flatten()
    }
}

pub trait HistoryStore {
    fn append(&mut self, row: &HistoryRow) -> Result<(), PersistenceError>;

    /// Rows with `from <= timestamp < to`, oldest first.
    fn query(&self, from: i64, to: i64) -> Result<Vec<HistoryRow>, PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::NO_READING;

    #[test]
    fn missing_readings_serialize_as_null() {
        let row = HistoryRow::new(1_700_000_000, vec![true, false], false)
            .with_reading("inside_temp", 41.0)
            .with_reading("light_lux", NO_READING);

        let json = serde_json::to_string(&row).unwrap();
        let back: HistoryRow = serde_json::from_str(&json).unwrap();

        assert!(json.contains("\"light_lux\":null"));
        assert_eq!(back.reading("inside_temp"), Some(41.0));
        assert_eq!(back.reading("light_lux"), None);
        assert_eq!(back, row);
    }
}
