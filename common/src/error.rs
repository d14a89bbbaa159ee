use thiserror::Error;

/// A configuration mutation that could not be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f32 },

    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("unknown setting {0:?}")]
    UnknownField(String),

    #[error("unknown device {0:?}")]
    UnknownDevice(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("settings i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings format error: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("actuator write failed: {0}")]
    Write(String),

    #[error("actuator write failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}
