// MIT License - Copyright (c) 2026 ialarm2mqtt contributors
// MQTT bridge

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use ialarm_bridge::{
    AlarmPanel, ClientConfig, Coordinator, IAlarm, IAlarmError, ZoneSensor, ZoneStatus,
};
use ialarm_bridge::entity::alarm::{DEVICE_NAME, MANUFACTURER};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ialarm2mqtt")]
#[command(about = "Bridge between an iAlarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<u32, String>,
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_panel_port")]
    port: u16,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
    #[serde(default = "default_scan_interval")]
    scan_interval_secs: u64,
    #[serde(default = "default_setup_retry_delay")]
    setup_retry_delay_ms: u64,
}

fn default_panel_port() -> u16 {
    ialarm_bridge::DEFAULT_PORT
}
fn default_connect_timeout() -> u64 {
    10000
}
fn default_command_timeout() -> u64 {
    30000
}
fn default_scan_interval() -> u64 {
    30
}
fn default_setup_retry_delay() -> u64 {
    30000
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_base_topic")]
    base_topic: String,
    #[serde(default = "default_discovery_prefix")]
    discovery_prefix: String,
    #[serde(default = "default_discovery")]
    discovery: bool,
}

fn default_client_id() -> String {
    "ialarm-bridge".to_string()
}
fn default_base_topic() -> String {
    "ialarm".to_string()
}
fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}
fn default_discovery() -> bool {
    true
}

fn build_client_config(toml: &PanelToml) -> ClientConfig {
    ClientConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .connect_timeout(Duration::from_millis(toml.connect_timeout_ms))
        .command_timeout(Duration::from_millis(toml.command_timeout_ms))
        .scan_interval(Duration::from_secs(toml.scan_interval_secs))
        .build()
}

// ---------------------------------------------------------------------------
// MQTT topics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Topics {
    base: String,
    alarm_state: String,
    availability: String,
    command: String,
    event: String,
}

impl Topics {
    fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            alarm_state: format!("{base}/alarm/state"),
            availability: format!("{base}/availability"),
            command: format!("{base}/cmd"),
            event: format!("{base}/event"),
        }
    }

    fn zone_state(&self, zone_id: u32) -> String {
        format!("{}/zone/{zone_id}/state", self.base)
    }
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    max_entries: Option<usize>,
}

// CMD_ACK response: {now, op, success, error?}
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// Log query response: {now, op, entries}
#[derive(Serialize)]
struct MqttLogResponse {
    now: u64,
    op: String,
    entries: Vec<ialarm_bridge::LogEntry>,
}

// Zone state: {open, problem, bypass, lowBattery, alarm}
#[derive(Serialize)]
struct MqttZoneState {
    open: bool,
    problem: bool,
    bypass: bool,
    #[serde(rename = "lowBattery")]
    low_battery: bool,
    alarm: bool,
}

impl From<&ZoneStatus> for MqttZoneState {
    fn from(zone: &ZoneStatus) -> Self {
        Self {
            open: zone.is_open(),
            problem: zone.has_problem(),
            bypass: zone.is_bypassed(),
            low_battery: zone.is_low_battery(),
            alarm: zone.is_alarm(),
        }
    }
}

// ---------------------------------------------------------------------------
// Home Assistant MQTT discovery
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DiscoveryDevice {
    identifiers: Vec<String>,
    name: String,
    manufacturer: String,
}

#[derive(Serialize)]
struct AlarmDiscovery {
    name: Option<String>,
    unique_id: String,
    state_topic: String,
    command_topic: String,
    command_template: String,
    availability_topic: String,
    code: String,
    code_arm_required: bool,
    code_disarm_required: bool,
    supported_features: Vec<String>,
    device: DiscoveryDevice,
}

#[derive(Serialize)]
struct ZoneDiscovery {
    name: String,
    unique_id: String,
    state_topic: String,
    value_template: String,
    payload_on: String,
    payload_off: String,
    device_class: String,
    availability_topic: String,
    json_attributes_topic: String,
    device: DiscoveryDevice,
}

fn discovery_device(mac: &str) -> DiscoveryDevice {
    DiscoveryDevice {
        identifiers: vec![format!("ialarm-{mac}")],
        name: DEVICE_NAME.to_string(),
        manufacturer: MANUFACTURER.to_string(),
    }
}

async fn publish_discovery(
    client: &AsyncClient,
    config: &MqttToml,
    topics: &Topics,
    panel: &AlarmPanel,
    zones: &[ZoneSensor],
    zone_names: &HashMap<u32, String>,
    mac: &str,
) {
    if !config.discovery {
        return;
    }

    let alarm = AlarmDiscovery {
        name: None,
        unique_id: panel.unique_id().to_string(),
        state_topic: topics.alarm_state.clone(),
        command_topic: topics.command.clone(),
        command_template: r#"{"op":"{{ action }}","code":"{{ code }}"}"#.to_string(),
        availability_topic: topics.availability.clone(),
        code: "REMOTE_CODE".to_string(),
        code_arm_required: false,
        code_disarm_required: true,
        supported_features: vec!["arm_home".to_string(), "arm_away".to_string()],
        device: discovery_device(mac),
    };
    let topic = format!(
        "{}/alarm_control_panel/ialarm-{mac}/alarm/config",
        config.discovery_prefix
    );
    publish_json(client, &topic, &alarm, true).await;

    for zone in zones {
        let name = zone_names
            .get(&zone.zone_id())
            .cloned()
            .unwrap_or_else(|| format!("Zone {}", zone.zone_id()));
        let discovery = ZoneDiscovery {
            name,
            unique_id: zone.unique_id().to_string(),
            state_topic: topics.zone_state(zone.zone_id()),
            value_template: "{{ value_json.open }}".to_string(),
            payload_on: "true".to_string(),
            payload_off: "false".to_string(),
            device_class: "door".to_string(),
            availability_topic: topics.availability.clone(),
            json_attributes_topic: topics.zone_state(zone.zone_id()),
            device: discovery_device(mac),
        };
        let topic = format!(
            "{}/binary_sensor/ialarm-{mac}/zone_{}/config",
            config.discovery_prefix,
            zone.zone_id()
        );
        publish_json(client, &topic, &discovery, true).await;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_str(client: &AsyncClient, topic: &str, payload: &str, retain: bool) {
    if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, payload).await {
        error!("Failed to publish to {topic}: {e}");
    }
}

async fn publish_cmd_ack(client: &AsyncClient, topic: &str, op: &str, result: Result<(), IAlarmError>) {
    let ack = match result {
        Ok(()) => MqttCmdAck {
            now: now_epoch_ms(),
            op: op.to_string(),
            success: true,
            error: None,
        },
        Err(e) => MqttCmdAck {
            now: now_epoch_ms(),
            op: op.to_string(),
            success: false,
            error: Some(e.to_string()),
        },
    };
    publish_json(client, topic, &ack, false).await;
}

/// Publish availability plus the current alarm and zone state.
///
/// While the coordinator has no snapshot (failed poll) only `offline`
/// availability goes out; the stale retained state is left masked by it.
async fn publish_state(client: &AsyncClient, topics: &Topics, coordinator: &Coordinator) {
    match coordinator.snapshot() {
        Some(snapshot) => {
            publish_str(client, &topics.availability, "online", true).await;
            publish_str(client, &topics.alarm_state, snapshot.alarm.as_str(), true).await;
            for zone in &snapshot.zones {
                if !zone.in_use() {
                    continue;
                }
                let topic = topics.zone_state(zone.id);
                publish_json(client, &topic, &MqttZoneState::from(zone), true).await;
            }
        }
        None => {
            publish_str(client, &topics.availability, "offline", true).await;
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Execute a panel command future and log the result.
async fn exec_panel_cmd(
    op: &str,
    fut: impl std::future::Future<Output = Result<(), IAlarmError>>,
) -> Result<(), IAlarmError> {
    match fut.await {
        Ok(()) => {
            info!("{op}: success");
            Ok(())
        }
        Err(e) => {
            error!("{op} failed: {e}");
            Err(e)
        }
    }
}

async fn handle_command(
    cmd: MqttCommand,
    client: &AsyncClient,
    topics: &Topics,
    panel: &AlarmPanel,
    coordinator: &Coordinator,
) {
    match cmd.op.as_str() {
        "ARM_AWAY" => {
            info!("Command: ARM_AWAY");
            let result = exec_panel_cmd("ARM_AWAY", panel.arm_away()).await;
            publish_cmd_ack(client, &topics.event, "ARM_AWAY", result).await;
        }

        "ARM_HOME" => {
            info!("Command: ARM_HOME");
            let result = exec_panel_cmd("ARM_HOME", panel.arm_home()).await;
            publish_cmd_ack(client, &topics.event, "ARM_HOME", result).await;
        }

        "DISARM" => {
            info!("Command: DISARM");
            let result = exec_panel_cmd("DISARM", panel.disarm(cmd.code.as_deref())).await;
            publish_cmd_ack(client, &topics.event, "DISARM", result).await;
        }

        "GET_LOG" => {
            let max_entries = cmd.max_entries.unwrap_or(10);
            info!("Command: GET_LOG max_entries={max_entries}");
            match panel.last_log_entries(max_entries).await {
                Ok(entries) => {
                    let response = MqttLogResponse {
                        now: now_epoch_ms(),
                        op: "LOG".to_string(),
                        entries,
                    };
                    publish_json(client, &topics.event, &response, false).await;
                }
                Err(e) => {
                    error!("GET_LOG failed: {e}");
                    publish_cmd_ack(client, &topics.event, "GET_LOG", Err(e)).await;
                }
            }
        }

        "REFRESH" => {
            debug!("Command: REFRESH");
            let result = exec_panel_cmd("REFRESH", async {
                coordinator.refresh().await.map(|_| ())
            })
            .await;
            publish_cmd_ack(client, &topics.event, "REFRESH", result).await;
        }

        other => {
            warn!("Unknown command: {other}");
            publish_cmd_ack(
                client,
                &topics.event,
                other,
                Err(IAlarmError::InvalidResponse {
                    details: format!("unknown command: {other}"),
                }),
            )
            .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=ialarm_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let mut config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let client_config = build_client_config(&config.panel);
        let setup_retry_delay_ms = config.panel.setup_retry_delay_ms;

        // Connect to the panel. Not-ready conditions (unreachable device,
        // handshake timeout) retry with capped exponential backoff rather
        // than aborting the process.
        let coordinator = {
            let mut attempt: u32 = 0;
            loop {
                info!(
                    "Connecting to iAlarm panel at {}:{}",
                    client_config.host, client_config.port
                );
                let driver = Arc::new(IAlarm::new(client_config.clone()));
                match Coordinator::connect(driver, &client_config).await {
                    Ok(coordinator) => break coordinator,
                    Err(e) => {
                        let delay_ms = setup_retry_delay_ms * (1u64 << attempt.min(4));
                        warn!("Panel not ready ({e}), retrying in {:.1}s", delay_ms as f64 / 1000.0);
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt += 1;
                    }
                }
            }
        };
        let mac = coordinator.mac().to_string();
        info!("Panel {mac} connected and initialized");

        // Entities: the alarm panel plus one sensor per zone the panel
        // reports as provisioned (or that has a configured name).
        let panel = AlarmPanel::new(Arc::clone(&coordinator));
        let zones: Vec<ZoneSensor> = coordinator
            .snapshot()
            .map(|snapshot| {
                snapshot
                    .zones
                    .iter()
                    .filter(|z| z.in_use() || config.zone_names.contains_key(&z.id))
                    .map(|z| ZoneSensor::new(Arc::clone(&coordinator), z.id))
                    .collect()
            })
            .unwrap_or_default();

        // Set up MQTT
        let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        let topics = Topics::new(&config.mqtt.base_topic);
        client
            .subscribe(&topics.command, QoS::AtLeastOnce)
            .await
            .context("Failed to subscribe to MQTT command topic")?;
        info!("MQTT: subscribed to {}", topics.command);

        publish_discovery(&client, &config.mqtt, &topics, &panel, &zones, &config.zone_names, &mac)
            .await;
        publish_state(&client, &topics, &coordinator).await;

        // Task 1: state publisher — pushes every snapshot change to MQTT
        let coordinator_state = Arc::clone(&coordinator);
        let client_state = client.clone();
        let topics_state = topics.clone();
        let mut snapshot_rx = coordinator.subscribe();
        let state_handle = tokio::spawn(async move {
            while snapshot_rx.changed().await.is_ok() {
                publish_state(&client_state, &topics_state, &coordinator_state).await;
            }
        });

        // Task 2: MQTT event loop (receives messages, handles commands)
        let coordinator_cmds = Arc::clone(&coordinator);
        let client_cmds = client.clone();
        let topics_cmds = topics.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // (Re)subscribe after every broker connect/reconnect.
                        // rumqttc does not auto-resubscribe, so without this a
                        // broker restart silently drops our subscription and we
                        // stop receiving commands.
                        info!("MQTT: connected, subscribing to {}", topics_cmds.command);
                        if let Err(e) = client_cmds
                            .subscribe(&topics_cmds.command, QoS::AtLeastOnce)
                            .await
                        {
                            error!("Failed to subscribe to {}: {e}", topics_cmds.command);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == topics_cmds.command {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    info!("MQTT command received: {payload}");
                                    handle_command(
                                        cmd,
                                        &client_cmds,
                                        &topics_cmds,
                                        &panel,
                                        &coordinator_cmds,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        // Abort tasks, mark the device offline, release the connection
        state_handle.abort();
        mqtt_handle.abort();
        publish_str(&client, &topics.availability, "offline", true).await;
        coordinator.shutdown().await;
        if let Err(e) = client.disconnect().await {
            warn!("Error disconnecting MQTT client: {e}");
        }

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match std::fs::read_to_string(&cli.config)
            .context("Failed to read config file")
            .and_then(|text| {
                toml::from_str::<Config>(&text).context("Failed to parse config file")
            }) {
            Ok(new_config) => match parse_mqtt_url(&new_config.mqtt.url) {
                Ok(_) => {
                    config = new_config;
                    info!("Config reloaded successfully");
                }
                Err(e) => warn!("Invalid MQTT URL in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str
        .parse()
        .context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
