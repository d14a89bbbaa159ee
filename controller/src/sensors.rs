use std::{
    collections::HashMap,
    f32::consts::PI,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{debug, warn};

use coop_common::{
    sensor::FixedSensor, Clock, LogLux, Reading, ReadingCache, RuntimeConfig, SensorBackend,
    SensorConfig, SensorSource, CHANNEL_CPU_TEMP, CHANNEL_INSIDE_HUMIDITY, CHANNEL_INSIDE_TEMP,
    CHANNEL_LIGHT_LUX, CHANNEL_OUTSIDE_HUMIDITY, CHANNEL_OUTSIDE_TEMP, NO_READING,
};

use crate::host::monotonic_ms;

/// Daily cosine curve peaking at `peak_hour`.
#[derive(Debug, Clone, Copy)]
pub struct DiurnalProfile {
    pub mean: f32,
    pub amplitude: f32,
    pub peak_hour: f32,
    pub floor: f32,
}

impl DiurnalProfile {
    pub fn value_at(&self, hours: f32) -> f32 {
        let phase = 2.0 * PI * (hours - self.peak_hour) / 24.0;
        (self.mean + self.amplitude * phase.cos()).max(self.floor)
    }
}

/// Host stand-in for an I2C sensor: values follow a daily curve.
pub struct SimulatedSensor {
    profile: DiurnalProfile,
    clock: Arc<dyn Clock>,
    cache: ReadingCache,
}

impl SimulatedSensor {
    pub fn new(profile: DiurnalProfile, clock: Arc<dyn Clock>) -> Self {
        let sensor = Self {
            profile,
            clock,
            cache: ReadingCache::new(),
        };
        sensor.read_live();
        sensor
    }
}

impl SensorSource for SimulatedSensor {
    fn read_live(&self) -> Reading {
        let value = self.profile.value_at(self.clock.now().hours());
        self.cache.store(value);
        value
    }

    fn read_cached(&self) -> Reading {
        self.cache.get()
    }
}

/// Values pushed by the remote sensor node.
pub struct MqttSensor {
    channel: &'static str,
    cache: ReadingCache,
    last_update_ms: AtomicU64,
    stale_timeout_ms: u64,
}

impl MqttSensor {
    const NEVER: u64 = u64::MAX;

    pub fn new(channel: &'static str, stale_timeout_ms: u64) -> Self {
        Self {
            channel,
            cache: ReadingCache::new(),
            last_update_ms: AtomicU64::new(Self::NEVER),
            stale_timeout_ms,
        }
    }

    pub fn push(&self, value: Reading, now_ms: u64) -> bool {
        if !self.cache.store(value) {
            return false;
        }
        self.last_update_ms.store(now_ms, Ordering::Relaxed);
        true
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        match self.last_update_ms.load(Ordering::Relaxed) {
            Self::NEVER => true,
            last => now_ms.saturating_sub(last) >= self.stale_timeout_ms,
        }
    }
}

impl SensorSource for MqttSensor {
    /// The freshest pushed value is the live value; a stale one is still
    /// served, with a warning.
    fn read_live(&self) -> Reading {
        if self.is_stale(monotonic_ms()) {
            warn!(channel = self.channel, "no fresh reading, using cached value");
        }
        self.cache.get()
    }

    fn read_cached(&self) -> Reading {
        self.cache.get()
    }
}

/// CPU temperature from the kernel thermal zone, in °F.
pub struct SysfsThermal {
    path: PathBuf,
    cache: ReadingCache,
}

impl SysfsThermal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: ReadingCache::new(),
        }
    }

    fn read_file(&self) -> anyhow::Result<Reading> {
        let raw = std::fs::read_to_string(&self.path)?;
        let millicelsius: f32 = raw.trim().parse()?;
        Ok(millicelsius / 1000.0 * 9.0 / 5.0 + 32.0)
    }
}

impl SensorSource for SysfsThermal {
    fn read_live(&self) -> Reading {
        match self.read_file() {
            Ok(value) => {
                self.cache.store(value);
                value
            }
            Err(err) => {
                debug!(path = %self.path.display(), "cpu temperature read failed: {err:#}");
                self.cache.get()
            }
        }
    }

    fn read_cached(&self) -> Reading {
        self.cache.get()
    }
}

/// Every sensor channel of the coop, by name.
pub struct SensorBank {
    channels: Vec<(&'static str, Arc<dyn SensorSource>)>,
    pushed: HashMap<&'static str, Arc<MqttSensor>>,
    limits: SensorConfig,
}

impl SensorBank {
    pub fn build(config: &RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        let mut bank = Self {
            channels: Vec::new(),
            pushed: HashMap::new(),
            limits: config.sensors.clone(),
        };

        let environment = [
            (CHANNEL_INSIDE_TEMP, profile(58.0, 12.0, 15.0, -40.0)),
            (CHANNEL_INSIDE_HUMIDITY, profile(45.0, 10.0, 5.0, 0.0)),
            (CHANNEL_OUTSIDE_TEMP, profile(52.0, 18.0, 15.0, -40.0)),
            (CHANNEL_OUTSIDE_HUMIDITY, profile(50.0, 15.0, 5.0, 0.0)),
            (CHANNEL_LIGHT_LUX, profile(0.0, 30_000.0, 13.0, 0.0)),
        ];

        for (channel, curve) in environment {
            let sensor: Arc<dyn SensorSource> = match config.sensors.backend {
                SensorBackend::Simulated => Arc::new(SimulatedSensor::new(curve, clock.clone())),
                SensorBackend::Mqtt => {
                    let sensor = Arc::new(MqttSensor::new(
                        channel,
                        config.coop.sensor_stale_timeout_ms,
                    ));
                    bank.pushed.insert(channel, sensor.clone());
                    sensor
                }
            };
            bank.channels.push((channel, sensor));
        }

        bank.channels.push((
            CHANNEL_CPU_TEMP,
            Arc::new(SysfsThermal::new(config.sensors.cpu_thermal_path.clone())),
        ));

        bank
    }

    pub fn channel(&self, name: &str) -> Option<Arc<dyn SensorSource>> {
        self.channels
            .iter()
            .find(|(channel, _)| *channel == name)
            .map(|(_, sensor)| sensor.clone())
    }

    /// The sensor feeding the outlet temperature triggers.
    pub fn coop_temperature(&self) -> Arc<dyn SensorSource> {
        self.channel(CHANNEL_INSIDE_TEMP)
            .unwrap_or_else(|| Arc::new(FixedSensor::absent()))
    }

    /// The sensor feeding the door light trigger, in log-lux.
    pub fn door_light(&self) -> Arc<dyn SensorSource> {
        match self.channel(CHANNEL_LIGHT_LUX) {
            Some(lux) => Arc::new(LogLux::new(lux)),
            None => Arc::new(FixedSensor::absent()),
        }
    }

    /// Accepts a value pushed for `channel`; returns whether it was used.
    pub fn push(&self, channel: &str, value: Reading) -> bool {
        let Some(sensor) = self.pushed.get(channel) else {
            return false;
        };
        if channel.ends_with("_temp") && !self.limits.is_valid_temp(value) {
            return false;
        }
        if channel.ends_with("_humidity") && !(0.0..=100.0).contains(&value) {
            return false;
        }
        if channel == CHANNEL_LIGHT_LUX && !(value >= 0.0) {
            return false;
        }
        sensor.push(value, monotonic_ms())
    }

    pub fn cached_reading(&self, channel: &str) -> Reading {
        self.channel(channel)
            .map_or(NO_READING, |sensor| sensor.read_cached())
    }

    /// Live-reads every channel, refreshing the caches.
    pub fn refresh(&self) -> Vec<(&'static str, Reading)> {
        self.channels
            .iter()
            .map(|(channel, sensor)| (*channel, sensor.read_live()))
            .collect()
    }
}

fn profile(mean: f32, amplitude: f32, peak_hour: f32, floor: f32) -> DiurnalProfile {
    DiurnalProfile {
        mean,
        amplitude,
        peak_hour,
        floor,
    }
}

#[cfg(test)]
mod tests {
    use coop_common::{ClockTime, FixedClock, RuntimeConfig};

    use super::*;

    #[test]
    fn diurnal_profile_peaks_and_floors() {
        let light = profile(0.0, 30_000.0, 13.0, 0.0);
        assert!((light.value_at(13.0) - 30_000.0).abs() < 1.0);
        assert_eq!(light.value_at(1.0), 0.0);

        let temp = profile(58.0, 12.0, 15.0, -40.0);
        assert!((temp.value_at(3.0) - 46.0).abs() < 0.01);
    }

    #[test]
    fn simulated_sensor_caches_live_reads() {
        let clock = Arc::new(FixedClock(ClockTime::new(15, 0, 0)));
        let sensor = SimulatedSensor::new(profile(58.0, 12.0, 15.0, -40.0), clock);
        assert!((sensor.read_cached() - 70.0).abs() < 0.01);
        assert_eq!(sensor.read_live(), sensor.read_cached());
    }

    #[test]
    fn mqtt_sensor_staleness() {
        let sensor = MqttSensor::new(CHANNEL_INSIDE_TEMP, 1_000);
        assert!(sensor.is_stale(0));
        assert!(sensor.read_cached().is_nan());

        assert!(sensor.push(41.0, 5_000));
        assert!(!sensor.is_stale(5_500));
        assert!(sensor.is_stale(6_000));
        assert_eq!(sensor.read_cached(), 41.0);
        assert!(!sensor.push(f32::NAN, 6_000));
    }

    #[test]
    fn sysfs_thermal_converts_and_falls_back() {
        let path = std::env::temp_dir().join(format!("coop-thermal-{}", std::process::id()));
        std::fs::write(&path, "50000\n").unwrap();

        let sensor = SysfsThermal::new(&path);
        assert!((sensor.read_live() - 122.0).abs() < 0.01);

        std::fs::remove_file(&path).unwrap();
        assert!((sensor.read_live() - 122.0).abs() < 0.01);
    }

    #[test]
    fn bank_rejects_out_of_range_pushes() {
        let mut config = RuntimeConfig::default();
        config.sensors.backend = SensorBackend::Mqtt;
        let bank = SensorBank::build(&config, Arc::new(FixedClock(ClockTime::new(0, 0, 0))));

        assert!(bank.push(CHANNEL_INSIDE_TEMP, 38.5));
        assert!(!bank.push(CHANNEL_INSIDE_TEMP, 400.0));
        assert!(!bank.push(CHANNEL_INSIDE_HUMIDITY, 140.0));
        assert!(!bank.push(CHANNEL_LIGHT_LUX, -1.0));
        assert!(!bank.push(CHANNEL_CPU_TEMP, 120.0));
        assert!(!bank.push("unknown", 1.0));

        assert_eq!(bank.coop_temperature().read_cached(), 38.5);
        assert_eq!(bank.cached_reading(CHANNEL_INSIDE_TEMP), 38.5);
        assert!(bank.door_light().read_cached().is_nan());
    }
}
