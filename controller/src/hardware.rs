use tracing::info;

use coop_common::{ActuatorError, DoorMotor, RelayActuator};

/// Relay board stand-in for host builds: writes are logged and remembered.
#[derive(Debug)]
pub struct HostRelayBoard {
    names: Vec<String>,
    states: Vec<bool>,
}

impl HostRelayBoard {
    pub fn new(names: Vec<String>) -> Self {
        let states = vec![false; names.len()];
        Self { names, states }
    }
}

impl RelayActuator for HostRelayBoard {
    fn write(&mut self, states: &[bool]) -> Result<(), ActuatorError> {
        if states.len() != self.names.len() {
            return Err(ActuatorError::Write(format!(
                "expected {} relay states, got {}",
                self.names.len(),
                states.len()
            )));
        }

        for ((name, previous), next) in self.names.iter().zip(&self.states).zip(states) {
            if previous != next {
                info!(outlet = %name, on = next, "relay switched");
            }
        }
        self.states.copy_from_slice(states);
        Ok(())
    }

    fn current_commanded_state(&self) -> &[bool] {
        &self.states
    }
}

#[derive(Debug, Default)]
pub struct HostDoorMotor {
    open: bool,
}

impl DoorMotor for HostDoorMotor {
    fn drive(&mut self, open: bool) -> Result<(), ActuatorError> {
        info!(open, "door driven");
        self.open = open;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_board_tracks_commanded_state() {
        let mut board = HostRelayBoard::new(vec!["Heat Lamp".to_string(), "Fan".to_string()]);
        assert_eq!(board.current_commanded_state(), &[false, false]);

        board.write(&[true, false]).unwrap();
        assert_eq!(board.current_commanded_state(), &[true, false]);

        assert!(board.write(&[true]).is_err());
        assert_eq!(board.current_commanded_state(), &[true, false]);
    }

    #[test]
    fn door_motor_remembers_position() {
        let mut door = HostDoorMotor::default();
        assert!(!door.is_open());
        door.drive(true).unwrap();
        assert!(door.is_open());
    }
}
