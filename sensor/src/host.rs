use std::{f32::consts::PI, time::Duration};

use anyhow::Context;
use chrono::{Local, Timelike};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, info, warn};

use coop_common::{
    sensor_topic, ClockTime, CHANNEL_INSIDE_HUMIDITY, CHANNEL_INSIDE_TEMP, CHANNEL_LIGHT_LUX,
    CHANNEL_OUTSIDE_HUMIDITY, CHANNEL_OUTSIDE_TEMP, TOPIC_SENSOR_STATUS,
};

const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("coop-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(rumqttc::LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("sensor publisher started");

    let mut interval = tokio::time::interval(PUBLISH_INTERVAL);

    loop {
        interval.tick().await;
        let local = Local::now();

        // Hardware integration point: swap these for the I2C sensor drivers.
        for (channel, value) in readings(ClockTime::from_chrono(&local), local.second()) {
            let topic = sensor_topic(channel);
            mqtt.publish(topic, QoS::AtLeastOnce, true, format!("{value:.1}"))
                .await
                .with_context(|| format!("failed to publish {channel}"))?;
            debug!(channel, value, "published reading");
        }
    }
}

/// Simulated readings for `now`; `jitter` adds a little sample-to-sample noise.
fn readings(now: ClockTime, jitter: u32) -> [(&'static str, f32); 5] {
    let hours = now.hours();
    let wobble = (jitter % 5) as f32 * 0.1;
    let daily = |peak: f32| (2.0 * PI * (hours - peak) / 24.0).cos();

    [
        (CHANNEL_INSIDE_TEMP, 58.0 + 12.0 * daily(15.0) + wobble),
        (CHANNEL_INSIDE_HUMIDITY, (45.0 + 10.0 * daily(5.0)).clamp(0.0, 100.0)),
        (CHANNEL_OUTSIDE_TEMP, 52.0 + 18.0 * daily(15.0) - wobble),
        (CHANNEL_OUTSIDE_HUMIDITY, (50.0 + 15.0 * daily(5.0)).clamp(0.0, 100.0)),
        (CHANNEL_LIGHT_LUX, (30_000.0 * daily(13.0)).max(0.0)),
    ]
}
