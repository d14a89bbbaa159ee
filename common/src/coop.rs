use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    clock::ClockTime,
    config::CoopConfig,
    device::{DeviceController, DeviceId, SettingField},
    error::ConfigError,
    sensor::SensorSource,
    settings::SettingsSnapshot,
    trigger::TriggerKind,
    types::{CoopStatus, OutletStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Write the full outlet relay vector.
    SetRelays(Vec<bool>),
    DriveDoor { open: bool },
}

/// All controlled devices, evaluated together against one captured time per tick.
#[derive(Debug)]
pub struct CoopEngine {
    outlets: Vec<DeviceController>,
    door: DeviceController,
    actuation_interval_secs: u8,
    last_actuation: Option<ClockTime>,
}

impl CoopEngine {
    pub fn new(
        outlets: Vec<DeviceController>,
        door: DeviceController,
        actuation_interval_secs: u8,
    ) -> Self {
        Self {
            outlets,
            door,
            actuation_interval_secs: actuation_interval_secs.max(1),
            last_actuation: None,
        }
    }

    /// Builds one outlet per configured name, all triggered by the coop
    /// temperature sensor, plus the door triggered by the light sensor
    /// (in log-lux).
    pub fn from_config(
        config: &CoopConfig,
        temperature: Arc<dyn SensorSource>,
        light: Arc<dyn SensorSource>,
    ) -> Self {
        let outlets = config
            .outlets
            .iter()
            .enumerate()
            .map(|(index, name)| {
                DeviceController::new(
                    DeviceId::Outlet(index + 1),
                    name.clone(),
                    TriggerKind::Temperature,
                    temperature.clone(),
                )
            })
            .collect();
        let door = DeviceController::new(
            DeviceId::Door,
            config.door_name.clone(),
            TriggerKind::Light,
            light,
        );
        Self::new(outlets, door, config.actuation_interval_secs)
    }

    pub fn outlets(&self) -> &[DeviceController] {
        &self.outlets
    }

    pub fn door(&self) -> &DeviceController {
        &self.door
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceController> {
        match id {
            DeviceId::Door => Some(&self.door),
            DeviceId::Outlet(number) => number.checked_sub(1).and_then(|i| self.outlets.get(i)),
        }
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Result<&mut DeviceController, ConfigError> {
        match id {
            DeviceId::Door => Ok(&mut self.door),
            DeviceId::Outlet(number) => number
                .checked_sub(1)
                .and_then(|i| self.outlets.get_mut(i))
                .ok_or_else(|| ConfigError::UnknownDevice(id.to_string())),
        }
    }

    pub fn apply(
        &mut self,
        id: DeviceId,
        field: SettingField,
        raw: &str,
    ) -> Result<bool, ConfigError> {
        let changed = self.device_mut(id)?.apply(field, raw)?;
        if changed {
            debug!(device = %id, ?field, value = raw, "setting changed");
        }
        Ok(changed)
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            outlets: self.outlets.iter().map(|outlet| *outlet.config()).collect(),
            door: *self.door.config(),
        }
    }

    /// Loads persisted configs by position. Outlets missing from the
    /// snapshot keep their current config; extra entries are ignored.
    pub fn apply_snapshot(&mut self, snapshot: &SettingsSnapshot) {
        if snapshot.outlets.len() != self.outlets.len() {
            warn!(
                persisted = snapshot.outlets.len(),
                configured = self.outlets.len(),
                "persisted outlet count differs from configuration"
            );
        }
        for (outlet, config) in self.outlets.iter_mut().zip(&snapshot.outlets) {
            outlet.load_config(*config);
        }
        self.door.load_config(snapshot.door);
    }

    /// Whether `now` is an actuation boundary not yet handled.
    pub fn is_actuation_due(&self, now: ClockTime) -> bool {
        now.second % self.actuation_interval_secs == 0 && self.last_actuation != Some(now)
    }

    /// Evaluates live demands on actuation boundaries and returns the writes
    /// needed to bring the actuators in line. `relays` and `door_open` are the
    /// states currently commanded on the hardware.
    pub fn tick(&mut self, now: ClockTime, relays: &[bool], door_open: bool) -> Vec<EngineAction> {
        if !self.is_actuation_due(now) {
            return Vec::new();
        }
        self.last_actuation = Some(now);

        let mut actions = Vec::new();

        let demands: Vec<bool> = self.outlets.iter().map(|outlet| outlet.demand(now)).collect();
        if demands != relays {
            actions.push(EngineAction::SetRelays(demands));
        }

        let door_demand = self.door.demand(now);
        if door_demand != door_open {
            actions.push(EngineAction::DriveDoor { open: door_demand });
        }

        actions
    }

    /// Cached view of every device, for display. Never touches hardware.
    pub fn status(&self, now: ClockTime, relays: &[bool], door_open: bool) -> CoopStatus {
        CoopStatus {
            time: now.to_string(),
            outlets: self
                .outlets
                .iter()
                .enumerate()
                .map(|(index, outlet)| OutletStatus {
                    device: outlet.view(now),
                    energized: relays.get(index).copied().unwrap_or(false),
                })
                .collect(),
            door: self.door.view(now),
            door_open,
        }
    }
}
