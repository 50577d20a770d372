// MIT License - Copyright (c) 2026 ialarm2mqtt contributors
//
// Behavioral tests for the coordinator and entity layers, driven through a
// scripted mock driver. No network I/O; timer-dependent tests run on the
// paused tokio clock.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use ialarm_bridge::{
    AlarmClient, AlarmPanel, AlarmState, ClientConfig, Coordinator, DeviceStatus, IAlarmError,
    LogEntry, Result, ZoneSensor, ZoneStatus, ZoneStatusFlags,
};

/// Scripted in-memory driver.
///
/// `status_script` entries are consumed one per `get_status` call; once
/// empty, `default_status` repeats. Command invocations are counted so tests
/// can assert the driver was (or was not) reached.
struct MockClient {
    mac_result: Mutex<Option<Result<String>>>,
    mac_delay: Option<Duration>,
    default_status: DeviceStatus,
    status_script: Mutex<VecDeque<Result<DeviceStatus>>>,
    zones: Mutex<Vec<ZoneStatus>>,
    disarm_calls: AtomicUsize,
    arm_away_calls: AtomicUsize,
    arm_stay_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockClient {
    fn new() -> Self {
        Self {
            mac_result: Mutex::new(None),
            mac_delay: None,
            default_status: DeviceStatus::Disarmed,
            status_script: Mutex::new(VecDeque::new()),
            zones: Mutex::new(vec![ZoneStatus::new(
                1,
                "Front Door",
                ZoneStatusFlags::IN_USE,
            )]),
            disarm_calls: AtomicUsize::new(0),
            arm_away_calls: AtomicUsize::new(0),
            arm_stay_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    fn with_mac_error(self, error: IAlarmError) -> Self {
        *self.mac_result.lock().unwrap() = Some(Err(error));
        self
    }

    fn with_mac_delay(mut self, delay: Duration) -> Self {
        self.mac_delay = Some(delay);
        self
    }

    fn with_default_status(mut self, status: DeviceStatus) -> Self {
        self.default_status = status;
        self
    }

    fn push_status(&self, result: Result<DeviceStatus>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    fn set_zones(&self, zones: Vec<ZoneStatus>) {
        *self.zones.lock().unwrap() = zones;
    }
}

#[async_trait]
impl AlarmClient for MockClient {
    async fn get_mac(&self) -> Result<String> {
        if let Some(delay) = self.mac_delay {
            sleep(delay).await;
        }
        match self.mac_result.lock().unwrap().take() {
            Some(result) => result,
            None => Ok("00:11:22:33:44:55".to_string()),
        }
    }

    async fn get_status(&self) -> Result<DeviceStatus> {
        match self.status_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.default_status),
        }
    }

    async fn get_zone_status(&self) -> Result<Vec<ZoneStatus>> {
        Ok(self.zones.lock().unwrap().clone())
    }

    async fn arm_away(&self) -> Result<()> {
        self.arm_away_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn arm_stay(&self) -> Result<()> {
        self.arm_stay_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        self.disarm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_last_log_entries(&self, n: usize) -> Result<Vec<LogEntry>> {
        let entries = vec![
            LogEntry {
                time: "2026-02-07 08:15:00".to_string(),
                area: 1,
                event: "Disarm".to_string(),
            },
            LogEntry {
                time: "2026-02-06 22:30:00".to_string(),
                area: 0,
                event: "Arm away".to_string(),
            },
        ];
        Ok(entries.into_iter().take(n).collect())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .host("mock")
        .connect_timeout(Duration::from_secs(10))
        .scan_interval(Duration::from_secs(30))
        .build()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn setup_not_ready_when_handshake_exceeds_timeout() {
    let client = Arc::new(MockClient::new().with_mac_delay(Duration::from_secs(60)));
    let result = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config()).await;
    assert!(matches!(result, Err(IAlarmError::NotReady { .. })));
}

#[tokio::test]
async fn setup_not_ready_when_connection_refused() {
    let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
    let client = Arc::new(MockClient::new().with_mac_error(IAlarmError::Io(refused)));
    let result = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config()).await;
    assert!(matches!(result, Err(IAlarmError::NotReady { .. })));
}

#[tokio::test]
async fn setup_not_ready_when_first_refresh_fails_and_connection_released() {
    let client = Arc::new(MockClient::new());
    client.push_status(Err(IAlarmError::Disconnected));

    let result = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config()).await;
    assert!(matches!(result, Err(IAlarmError::NotReady { .. })));
    // Connection released exactly once even though no poll ever succeeded
    assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn setup_publishes_initial_snapshot() {
    let client = Arc::new(MockClient::new().with_default_status(DeviceStatus::ArmedStay));
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();

    assert_eq!(coordinator.mac(), "00:11:22:33:44:55");
    let snapshot = coordinator.snapshot().expect("first refresh ran during setup");
    assert_eq!(snapshot.alarm, AlarmState::ArmedHome);
    assert_eq!(snapshot.zones.len(), 1);

    coordinator.shutdown().await;
}

// ---------------------------------------------------------------------------
// Status mapping through the entity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entity_state_maps_device_codes() {
    let cases = [
        (DeviceStatus::ArmedAway, AlarmState::ArmedAway),
        (DeviceStatus::ArmedStay, AlarmState::ArmedHome),
        (DeviceStatus::Disarmed, AlarmState::Disarmed),
        (DeviceStatus::Triggered, AlarmState::Triggered),
        (DeviceStatus::Cancel, AlarmState::Unknown),
        (DeviceStatus::Other(77), AlarmState::Unknown),
    ];

    for (device, expected) in cases {
        let client = Arc::new(MockClient::new().with_default_status(device));
        let coordinator =
            Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
                .await
                .unwrap();
        let panel = AlarmPanel::new(Arc::clone(&coordinator));
        assert_eq!(panel.state(), Some(expected), "device status {device:?}");
        coordinator.shutdown().await;
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disarm_without_code_never_reaches_driver() {
    let client = Arc::new(MockClient::new());
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();
    let panel = AlarmPanel::new(Arc::clone(&coordinator));

    assert!(matches!(panel.disarm(None).await, Err(IAlarmError::MissingCode)));
    assert!(matches!(panel.disarm(Some("")).await, Err(IAlarmError::MissingCode)));
    assert_eq!(client.disarm_calls.load(Ordering::SeqCst), 0);

    panel.disarm(Some("1234")).await.unwrap();
    assert_eq!(client.disarm_calls.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn arm_commands_forward_without_code() {
    let client = Arc::new(MockClient::new());
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();
    let panel = AlarmPanel::new(Arc::clone(&coordinator));

    panel.arm_away().await.unwrap();
    panel.arm_home().await.unwrap();
    assert_eq!(client.arm_away_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.arm_stay_calls.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn log_entries_pass_through() {
    let client = Arc::new(MockClient::new());
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();
    let panel = AlarmPanel::new(Arc::clone(&coordinator));

    let entries = panel.last_log_entries(1).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, "Disarm");

    coordinator.shutdown().await;
}

// ---------------------------------------------------------------------------
// Poll failure and recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_failure_makes_entities_unavailable_not_stale() {
    let client = Arc::new(MockClient::new().with_default_status(DeviceStatus::ArmedAway));
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();
    let panel = AlarmPanel::new(Arc::clone(&coordinator));
    let zone = ZoneSensor::new(Arc::clone(&coordinator), 1);

    assert_eq!(panel.state(), Some(AlarmState::ArmedAway));
    assert!(zone.available());

    // Next poll fails: the previously published armed state must not
    // survive as the entity state.
    client.push_status(Err(IAlarmError::Disconnected));
    assert!(coordinator.refresh().await.is_err());
    assert!(!panel.available());
    assert_eq!(panel.state(), None);
    assert!(!zone.available());
    assert_eq!(zone.is_open(), None);

    // A subsequent successful poll restores availability.
    coordinator.refresh().await.unwrap();
    assert_eq!(panel.state(), Some(AlarmState::ArmedAway));
    assert!(zone.available());

    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn background_poll_picks_up_status_changes() {
    let client = Arc::new(MockClient::new().with_default_status(DeviceStatus::ArmedAway));
    client.push_status(Ok(DeviceStatus::Disarmed)); // consumed by the first refresh

    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();
    let mut rx = coordinator.subscribe();
    assert_eq!(coordinator.snapshot().unwrap().alarm, AlarmState::Disarmed);

    // Let the scan interval elapse; the poll task publishes the new state.
    tokio::time::sleep(Duration::from_secs(31)).await;
    rx.changed().await.unwrap();
    assert_eq!(coordinator.snapshot().unwrap().alarm, AlarmState::ArmedAway);

    coordinator.shutdown().await;
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zone_sensor_reflects_latest_zone_query() {
    let client = Arc::new(MockClient::new());
    client.set_zones(vec![
        ZoneStatus::new(1, "Front Door", ZoneStatusFlags::IN_USE),
        ZoneStatus::new(2, "Hallway", ZoneStatusFlags::IN_USE | ZoneStatusFlags::FAULT),
    ]);

    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();
    let door = ZoneSensor::new(Arc::clone(&coordinator), 1);
    let hallway = ZoneSensor::new(Arc::clone(&coordinator), 2);
    let missing = ZoneSensor::new(Arc::clone(&coordinator), 9);

    assert_eq!(door.is_open(), Some(false));
    assert_eq!(hallway.is_open(), Some(true));
    assert!(!missing.available());

    // Zone opens on the next poll
    client.set_zones(vec![
        ZoneStatus::new(1, "Front Door", ZoneStatusFlags::IN_USE | ZoneStatusFlags::FAULT),
        ZoneStatus::new(2, "Hallway", ZoneStatusFlags::IN_USE),
    ]);
    coordinator.refresh().await.unwrap();
    assert_eq!(door.is_open(), Some(true));
    assert_eq!(hallway.is_open(), Some(false));

    coordinator.shutdown().await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_releases_connection_exactly_once() {
    let client = Arc::new(MockClient::new());
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();

    coordinator.shutdown().await;
    coordinator.shutdown().await;
    assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unique_ids_derive_from_mac() {
    let client = Arc::new(MockClient::new());
    let coordinator = Coordinator::connect(Arc::clone(&client) as Arc<dyn AlarmClient>, &test_config())
        .await
        .unwrap();

    let panel = AlarmPanel::new(Arc::clone(&coordinator));
    let zone = ZoneSensor::new(Arc::clone(&coordinator), 3);
    assert_eq!(panel.unique_id(), "00:11:22:33:44:55-ialarm_status");
    assert_eq!(zone.unique_id(), "00:11:22:33:44:55-zone-3");

    coordinator.shutdown().await;
}
