use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ActuatorError;

/// Relay board driving the switched outlets.
pub trait RelayActuator: Send {
    fn write(&mut self, states: &[bool]) -> Result<(), ActuatorError>;

    /// The states last written successfully.
    fn current_commanded_state(&self) -> &[bool];
}

/// Motor driving the coop door.
pub trait DoorMotor: Send {
    fn drive(&mut self, open: bool) -> Result<(), ActuatorError>;

    fn is_open(&self) -> bool;
}

/// Bounded retry with linear backoff for actuator writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(rename = "backoffMs")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn sanitize(&mut self) {
        self.max_attempts = self.max_attempts.clamp(1, 20);
        self.backoff_ms = self.backoff_ms.min(10_000);
    }

    /// Delay before retry number `attempt` (1-based count of failures so far).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(attempt as u64))
    }

    /// Runs `write` until it succeeds or the attempts run out, calling
    /// `sleep` between attempts.
    pub fn run<W, S>(&self, mut write: W, mut sleep: S) -> Result<u32, ActuatorError>
    where
        W: FnMut() -> Result<(), ActuatorError>,
        S: FnMut(Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match write() {
                Ok(()) => return Ok(attempt),
                Err(err) => {
                    tracing::warn!(attempt, attempts, "actuator write failed: {err}");
                    last = err.to_string();
                    if attempt < attempts {
                        sleep(self.backoff(attempt));
                    }
                }
            }
        }
        Err(ActuatorError::RetriesExhausted { attempts, last })
    }
}
