use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use coop_common::{
    parse_command_topic, Clock, ClockTime, ConfigError, ControllerStatePayload, CoopConfig,
    CoopEngine, DeviceId, DeviceView, DoorMotor, EngineAction, HistoryRow, HistoryStore,
    RelayActuator, RuntimeConfig, SettingField, SettingsStore, CHANNEL_INSIDE_TEMP, CHANNEL_LIGHT_LUX,
    TOPIC_CMD_ALL, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_ALL, TOPIC_SENSOR_PREFIX,
    TOPIC_SENSOR_STATUS,
};

use crate::{
    hardware::{HostDoorMotor, HostRelayBoard},
    sensors::SensorBank,
    store::{AppStore, JsonSettingsStore, JsonlHistory},
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<CoopEngine>>,
    hardware: Arc<Mutex<Hardware>>,
    settings: Arc<Mutex<SettingsStore<JsonSettingsStore>>>,
    history: Arc<Mutex<JsonlHistory>>,
    sensors: Arc<SensorBank>,
    clock: Arc<ZoneClock>,
    coop: Arc<CoopConfig>,
    mqtt: AsyncClient,
}

struct Hardware {
    relays: Box<dyn RelayActuator>,
    door: Box<dyn DoorMotor>,
}

impl Hardware {
    fn commanded(&self) -> (Vec<bool>, bool) {
        (
            self.relays.current_commanded_state().to_vec(),
            self.door.is_open(),
        )
    }
}

/// Wall clock in the configured timezone.
struct ZoneClock {
    timezone: Tz,
}

impl Clock for ZoneClock {
    fn now(&self) -> ClockTime {
        ClockTime::from_chrono(&Utc::now().with_timezone(&self.timezone))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct DeviceUpdateResponse {
    changed: bool,
    device: DeviceView,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    time: String,
    timezone: String,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const DEFAULT_HISTORY_HOURS: i64 = 24;
const MAX_HISTORY_HOURS: i64 = 24 * 31;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store.load_or_default_runtime().await;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("coop-controller", mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let app_state = build_app_state(&runtime, &store, mqtt);

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/settings", get(handle_get_settings))
        .route("/api/devices/{id}", get(handle_get_device))
        .route("/api/devices/{id}/{field}", post(handle_set_device_field))
        .route("/api/history", get(handle_get_history))
        .route("/api/time", get(handle_get_time))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone());

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    persist_settings(&app_state).await;
    info!("controller stopped");
    Ok(())
}

fn build_app_state(runtime: &RuntimeConfig, store: &AppStore, mqtt: AsyncClient) -> AppState {
    let timezone = match runtime.timezone.parse::<Tz>() {
        Ok(timezone) => timezone,
        Err(err) => {
            warn!("invalid timezone {:?}, using UTC: {err}", runtime.timezone);
            chrono_tz::UTC
        }
    };
    let clock = Arc::new(ZoneClock { timezone });

    let sensors = Arc::new(SensorBank::build(runtime, clock.clone()));
    let mut engine = CoopEngine::from_config(
        &runtime.coop,
        sensors.coop_temperature(),
        sensors.door_light(),
    );

    let (settings, loaded) = store.open_settings(engine.snapshot());
    if let Some(loaded) = loaded {
        engine.apply_snapshot(&loaded);
    }

    let hardware = Hardware {
        relays: Box::new(HostRelayBoard::new(runtime.coop.outlets.clone())),
        door: Box::new(HostDoorMotor::default()),
    };

    AppState {
        engine: Arc::new(Mutex::new(engine)),
        hardware: Arc::new(Mutex::new(hardware)),
        settings: Arc::new(Mutex::new(settings)),
        history: Arc::new(Mutex::new(store.history(timezone))),
        sensors,
        clock,
        coop: Arc::new(runtime.coop.clone()),
        mqtt,
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_SENSOR_ALL, TOPIC_CMD_ALL] {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(app_state.coop.tick_ms));
        let mut last_history = None;

        loop {
            interval.tick().await;
            let now = app_state.clock.now();

            let (relays, door_open) = app_state.hardware.lock().await.commanded();
            let actions = {
                let mut engine = app_state.engine.lock().await;
                if engine.is_actuation_due(now) {
                    // Live sensor reads may block on hardware.
                    tokio::task::block_in_place(|| engine.tick(now, &relays, door_open))
                } else {
                    Vec::new()
                }
            };

            if !actions.is_empty() {
                execute_engine_actions(&app_state, actions).await;
            }

            persist_settings(&app_state).await;

            let second = now.seconds_of_day();
            if second % app_state.coop.history_interval_secs == 0 && last_history != Some(second) {
                last_history = Some(second);
                record_history(&app_state).await;
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(
            app_state.coop.state_publish_interval_ms,
        ));
        loop {
            interval.tick().await;

            let now = app_state.clock.now();
            let (relays, door_open) = app_state.hardware.lock().await.commanded();
            let status = {
                let engine = app_state.engine.lock().await;
                engine.status(now, &relays, door_open)
            };
            let payload = ControllerStatePayload::from_status(
                &status,
                app_state.sensors.cached_reading(CHANNEL_INSIDE_TEMP),
                app_state.sensors.cached_reading(CHANNEL_LIGHT_LUX),
            );

            match serde_json::to_vec(&payload) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

async fn execute_engine_actions(app_state: &AppState, actions: Vec<EngineAction>) {
    let retry = app_state.coop.relay_retry;
    let mut hardware = app_state.hardware.lock().await;

    for action in actions {
        info!("engine action: {action:?}");
        let result = tokio::task::block_in_place(|| match &action {
            EngineAction::SetRelays(states) => {
                retry.run(|| hardware.relays.write(states), std::thread::sleep)
            }
            EngineAction::DriveDoor { open } => {
                retry.run(|| hardware.door.drive(*open), std::thread::sleep)
            }
        });

        match result {
            Ok(1) => {}
            Ok(attempts) => info!(attempts, "actuator write succeeded after retry"),
            Err(err) => warn!("{err}"),
        }
    }
}

async fn persist_settings(app_state: &AppState) {
    let current = app_state.engine.lock().await.snapshot();
    let mut settings = app_state.settings.lock().await;
    match tokio::task::block_in_place(|| settings.check_for_change(&current)) {
        Ok(true) => info!("device settings saved"),
        Ok(false) => {}
        Err(err) => warn!("failed to save device settings: {err}"),
    }
}

async fn record_history(app_state: &AppState) {
    let readings = tokio::task::block_in_place(|| app_state.sensors.refresh());
    let (relays, door_open) = app_state.hardware.lock().await.commanded();

    let row = readings.into_iter().fold(
        HistoryRow::new(Utc::now().timestamp(), relays, door_open),
        |row, (channel, reading)| row.with_reading(channel, reading),
    );

    let mut history = app_state.history.lock().await;
    if let Err(err) = tokio::task::block_in_place(|| history.append(&row)) {
        warn!("failed to append history row: {err}");
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    if topic == TOPIC_SENSOR_STATUS {
        info!(status = message, "sensor node status");
        return Ok(());
    }

    if let Some(channel) = topic.strip_prefix(TOPIC_SENSOR_PREFIX) {
        match message.parse::<f32>() {
            Ok(value) if app_state.sensors.push(channel, value) => {
                debug!(channel, value, "sensor reading received");
            }
            _ => debug!(channel, payload = message, "ignoring sensor message"),
        }
        return Ok(());
    }

    if let Some((device, field)) = parse_command_topic(&topic) {
        let id: DeviceId = device.parse()?;
        let field: SettingField = field.parse()?;
        let changed = app_state.engine.lock().await.apply(id, field, message)?;
        info!(device = %id, ?field, value = message, changed, "mqtt command applied");
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.clock.now();
    let (relays, door_open) = state.hardware.lock().await.commanded();
    let status = {
        let engine = state.engine.lock().await;
        engine.status(now, &relays, door_open)
    };
    Json(status)
}

async fn handle_get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.engine.lock().await.snapshot();
    Json(snapshot)
}

async fn handle_get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match id.parse::<DeviceId>() {
        Ok(id) => id,
        Err(err) => return config_error_response(&err),
    };

    let now = state.clock.now();
    let engine = state.engine.lock().await;
    match engine.device(id) {
        Some(device) => Json(device.view(now)).into_response(),
        None => config_error_response(&ConfigError::UnknownDevice(id.to_string())),
    }
}

async fn handle_set_device_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let id = match id.parse::<DeviceId>() {
        Ok(id) => id,
        Err(err) => return config_error_response(&err),
    };
    let field = match field.parse::<SettingField>() {
        Ok(field) => field,
        Err(err) => return config_error_response(&err),
    };

    let now = state.clock.now();
    let mut engine = state.engine.lock().await;
    let changed = match engine.apply(id, field, value) {
        Ok(changed) => changed,
        Err(err) => return config_error_response(&err),
    };

    match engine.device(id) {
        Some(device) => Json(DeviceUpdateResponse {
            changed,
            device: device.view(now),
        })
        .into_response(),
        None => config_error_response(&ConfigError::UnknownDevice(id.to_string())),
    }
}

async fn handle_get_history(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let hours = match history_hours(params.get("hours").map(String::as_str)) {
        Ok(hours) => hours,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let to = Utc::now().timestamp() + 1;
    let from = to - hours * 3600;
    let history = state.history.lock().await;
    match tokio::task::block_in_place(|| history.query(from, to)) {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            warn!("history query failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read history")
        }
    }
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    Json(TimeStatus {
        time: state.clock.now().to_string(),
        timezone: state.clock.timezone.name().to_string(),
        now_epoch: Utc::now().timestamp(),
    })
}

fn history_hours(raw: Option<&str>) -> Result<i64, &'static str> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_HISTORY_HOURS);
    };
    match raw.trim().parse::<i64>() {
        Ok(hours) if (1..=MAX_HISTORY_HOURS).contains(&hours) => Ok(hours),
        Ok(_) => Err("hours must be between 1 and 744"),
        Err(_) => Err("Invalid 'hours' value"),
    }
}

fn config_error_status(err: &ConfigError) -> StatusCode {
    match err {
        ConfigError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn config_error_response(err: &ConfigError) -> axum::response::Response {
    error_response(config_error_status(err), &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
