use std::sync::atomic::{AtomicU32, Ordering};

/// A scalar sensor value: °F for temperatures, lux (or log-lux) for light.
pub type Reading = f32;

/// Returned by a cached read before the first good value. NaN compares false
/// against every threshold, so a trigger never fires on missing data.
pub const NO_READING: Reading = f32::NAN;

pub fn is_valid(reading: Reading) -> bool {
    reading.is_finite()
}

/// Source of one scalar reading.
///
/// `read_live` may touch hardware and be slow; when the hardware fails it
/// returns the last good value instead of an error. `read_cached` never
/// performs I/O.
pub trait SensorSource: Send + Sync {
    fn read_live(&self) -> Reading;

    fn read_cached(&self) -> Reading;
}

/// Lock-free last-known-good slot shared between a sensor's live and cached reads.
#[derive(Debug)]
pub struct ReadingCache {
    bits: AtomicU32,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(NO_READING.to_bits()),
        }
    }

    pub fn get(&self) -> Reading {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Stores `reading` if it is finite; returns whether it was stored.
    pub fn store(&self, reading: Reading) -> bool {
        if !is_valid(reading) {
            return false;
        }
        self.bits.store(reading.to_bits(), Ordering::Relaxed);
        true
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Presents a lux sensor as log10(lux), the unit of the door light threshold.
pub struct LogLux<S> {
    inner: S,
}

impl<S: SensorSource> LogLux<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn convert(lux: Reading) -> Reading {
        if !is_valid(lux) {
            return NO_READING;
        }
        // Full darkness reads as 0 lux; keep it at the bottom of the log scale.
        lux.max(1.0).log10()
    }
}

impl<S: SensorSource> SensorSource for LogLux<S> {
    fn read_live(&self) -> Reading {
        Self::convert(self.inner.read_live())
    }

    fn read_cached(&self) -> Reading {
        Self::convert(self.inner.read_cached())
    }
}

impl<S: SensorSource + ?Sized> SensorSource for std::sync::Arc<S> {
    fn read_live(&self) -> Reading {
        (**self).read_live()
    }

    fn read_cached(&self) -> Reading {
        (**self).read_cached()
    }
}

/// Fixed readings, for wiring devices that have no trigger sensor and for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSensor {
    pub live: Reading,
    pub cached: Reading,
}

impl FixedSensor {
    pub fn new(value: Reading) -> Self {
        Self {
            live: value,
            cached: value,
        }
    }

    pub fn absent() -> Self {
        Self::new(NO_READING)
    }
}

impl SensorSource for FixedSensor {
    fn read_live(&self) -> Reading {
        self.live
    }

    fn read_cached(&self) -> Reading {
        self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_starts_empty_and_ignores_invalid_values() {
        let cache = ReadingCache::new();
        assert!(cache.get().is_nan());

        assert!(cache.store(41.5));
        assert!(!cache.store(f32::NAN));
        assert!(!cache.store(f32::INFINITY));
        assert_eq!(cache.get(), 41.5);
    }

    #[test]
    fn log_lux_conversion() {
        let sensor = LogLux::new(FixedSensor {
            live: 1000.0,
            cached: 0.0,
        });
        assert!((sensor.read_live() - 3.0).abs() < 1e-6);
        assert_eq!(sensor.read_cached(), 0.0);

        let absent = LogLux::new(FixedSensor::absent());
        assert!(absent.read_cached().is_nan());
    }
}
