pub const TOPIC_SENSOR_PREFIX: &str = "coop/sensor/";
pub const TOPIC_SENSOR_ALL: &str = "coop/sensor/+";
pub const TOPIC_SENSOR_STATUS: &str = "coop/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "coop/controller/state";

/// Commands are `coop/cmnd/{device}/{field}`, e.g. `coop/cmnd/outlet1/on-time`.
pub const TOPIC_CMD_PREFIX: &str = "coop/cmnd/";
pub const TOPIC_CMD_ALL: &str = "coop/cmnd/+/+";

/// Sensor channel names, shared by the MQTT topics and history rows.
pub const CHANNEL_INSIDE_TEMP: &str = "inside_temp";
pub const CHANNEL_INSIDE_HUMIDITY: &str = "inside_humidity";
pub const CHANNEL_OUTSIDE_TEMP: &str = "outside_temp";
pub const CHANNEL_OUTSIDE_HUMIDITY: &str = "outside_humidity";
pub const CHANNEL_LIGHT_LUX: &str = "light_lux";
pub const CHANNEL_CPU_TEMP: &str = "cpu_temp";

pub fn sensor_topic(channel: &str) -> String {
    format!("{TOPIC_SENSOR_PREFIX}{channel}")
}

/// Splits a command topic into `(device, field)`.
pub fn parse_command_topic(topic: &str) -> Option<(&str, &str)> {
    let rest = topic.strip_prefix(TOPIC_CMD_PREFIX)?;
    let (device, field) = rest.split_once('/')?;
    if device.is_empty() || field.is_empty() || field.contains('/') {
        return None;
    }
    Some((device, field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_topics() {
        assert_eq!(
            parse_command_topic("coop/cmnd/outlet2/on-time"),
            Some(("outlet2", "on-time"))
        );
        assert_eq!(parse_command_topic("coop/cmnd/door"), None);
        assert_eq!(parse_command_topic("coop/cmnd/door/a/b"), None);
        assert_eq!(parse_command_topic("coop/sensor/light_lux"), None);
        assert_eq!(sensor_topic(CHANNEL_LIGHT_LUX), "coop/sensor/light_lux");
    }
}
