pub mod actuator;
pub mod clock;
pub mod config;
pub mod coop;
pub mod device;
pub mod error;
pub mod history;
pub mod schedule;
pub mod sensor;
pub mod settings;
pub mod time_window;
pub mod topics;
pub mod trigger;
pub mod types;

pub use actuator::{DoorMotor, RelayActuator, RetryPolicy};
pub use clock::{Clock, ClockTime, FixedClock};
pub use config::{CoopConfig, NetworkConfig, RuntimeConfig, SensorBackend, SensorConfig};
pub use coop::{CoopEngine, EngineAction};
pub use device::{DeviceController, DeviceId, DeviceView, SettingField};
pub use error::{ActuatorError, ConfigError, PersistenceError};
pub use history::{HistoryRow, HistoryStore};
pub use schedule::ScheduleConfig;
pub use sensor::{LogLux, Reading, ReadingCache, SensorSource, NO_READING};
pub use settings::{PersistenceStore, SettingsSnapshot, SettingsStore};
pub use time_window::{TimeWindow, TimeWindowKind};
pub use topics::*;
pub use trigger::{TriggerDirection, TriggerKind};
pub use types::{ControllerStatePayload, CoopStatus, OutletStatus};
