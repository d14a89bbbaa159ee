use serde::{Deserialize, Serialize};

use crate::actuator::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoopConfig {
    /// Display names of the relay-switched outlets, in relay order.
    pub outlets: Vec<String>,
    pub door_name: String,
    pub tick_ms: u64,
    /// Demands are evaluated and actuators written when the clock second is a
    /// multiple of this value.
    pub actuation_interval_secs: u8,
    pub history_interval_secs: u32,
    pub state_publish_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub relay_retry: RetryPolicy,
}

impl Default for CoopConfig {
    fn default() -> Self {
        Self {
            outlets: vec![
                "Heat Lamp".to_string(),
                "Water Heater".to_string(),
                "Fan".to_string(),
                "Lights".to_string(),
            ],
            door_name: "Door".to_string(),
            tick_ms: 500,
            actuation_interval_secs: 60,
            history_interval_secs: 60,
            state_publish_interval_ms: 10_000,
            sensor_stale_timeout_ms: 300_000,
            relay_retry: RetryPolicy::default(),
        }
    }
}

impl CoopConfig {
    pub const MAX_OUTLETS: usize = 8;

    pub fn sanitize(&mut self) {
        if self.outlets.is_empty() {
            self.outlets = Self::default().outlets;
        }
        self.outlets.truncate(Self::MAX_OUTLETS);
        self.tick_ms = self.tick_ms.clamp(100, 5_000);
        if self.actuation_interval_secs == 0 || 60 % self.actuation_interval_secs != 0 {
            self.actuation_interval_secs = 60;
        }
        if self.history_interval_secs == 0 || 86_400 % self.history_interval_secs != 0 {
            self.history_interval_secs = 60;
        }
        self.state_publish_interval_ms = self.state_publish_interval_ms.max(1_000);
        self.relay_retry.sanitize();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorBackend {
    /// Values synthesized from the time of day.
    Simulated,
    /// Values pushed by a remote sensor node over MQTT.
    Mqtt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub backend: SensorBackend,
    pub cpu_thermal_path: String,
    pub min_valid_temp_f: f32,
    pub max_valid_temp_f: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            backend: SensorBackend::Simulated,
            cpu_thermal_path: "/sys/class/thermal/thermal_zone0/temp".to_string(),
            min_valid_temp_f: -40.0,
            max_valid_temp_f: 150.0,
        }
    }
}

impl SensorConfig {
    pub fn is_valid_temp(&self, temp_f: f32) -> bool {
        temp_f.is_finite() && (self.min_valid_temp_f..=self.max_valid_temp_f).contains(&temp_f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub coop: CoopConfig,
    pub timezone: String,
    pub network: NetworkConfig,
    pub sensors: SensorConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            coop: CoopConfig::default(),
            timezone: "America/Phoenix".to_string(),
            network: NetworkConfig::default(),
            sensors: SensorConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.coop.sanitize();
        if self.sensors.min_valid_temp_f >= self.sensors.max_valid_temp_f {
            self.sensors.min_valid_temp_f = SensorConfig::default().min_valid_temp_f;
            self.sensors.max_valid_temp_f = SensorConfig::default().max_valid_temp_f;
        }
    }
}
