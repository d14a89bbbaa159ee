use serde::Serialize;

use crate::device::DeviceView;

#[derive(Debug, Clone, Serialize)]
pub struct OutletStatus {
    #[serde(flatten)]
    pub device: DeviceView,
    /// What the relay is actually commanded to, as opposed to the cached demand.
    pub energized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoopStatus {
    pub time: String,
    pub outlets: Vec<OutletStatus>,
    pub door: DeviceView,
    #[serde(rename = "doorOpen")]
    pub door_open: bool,
}

/// Compact state published to MQTT.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatePayload {
    pub time: String,
    pub outlets: Vec<bool>,
    #[serde(rename = "doorOpen")]
    pub door_open: bool,
    #[serde(rename = "insideTemp")]
    pub inside_temp: Option<f32>,
    #[serde(rename = "lightLux")]
    pub light_lux: Option<f32>,
}

impl ControllerStatePayload {
    pub fn from_status(status: &CoopStatus, inside_temp: f32, light_lux: f32) -> Self {
        Self {
            time: status.time.clone(),
            outlets: status.outlets.iter().map(|outlet| outlet.energized).collect(),
            door_open: status.door_open,
            inside_temp: inside_temp.is_finite().then_some(inside_temp),
            light_lux: light_lux.is_finite().then_some(light_lux),
        }
    }
}
