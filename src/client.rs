// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

use async_trait::async_trait;

use crate::error::Result;
use crate::state::{DeviceStatus, LogEntry, ZoneStatus};

/// The device-driver boundary.
///
/// Everything above this trait (coordinator, entities, the MQTT bridge) is
/// written against it rather than a concrete panel client, so the driver can
/// be swapped or mocked. All operations may fail with a connection-level
/// error; callers translate that into not-ready / update-failed signaling
/// instead of crashing the polling loop.
#[async_trait]
pub trait AlarmClient: Send + Sync {
    /// Fetch the panel's hardware identifier (MAC address).
    ///
    /// Used once at setup time; must complete within the caller's bounded
    /// timeout or setup reports not-ready.
    async fn get_mac(&self) -> Result<String>;

    /// Fetch the current alarm status code.
    async fn get_status(&self) -> Result<DeviceStatus>;

    /// Fetch the per-zone status list.
    async fn get_zone_status(&self) -> Result<Vec<ZoneStatus>>;

    /// Arm the panel in away mode. Fire-and-forget.
    async fn arm_away(&self) -> Result<()>;

    /// Arm the panel in stay/home mode. Fire-and-forget.
    async fn arm_stay(&self) -> Result<()>;

    /// Disarm the panel. Fire-and-forget. Code validation happens in the
    /// entity layer; the panel itself takes no code over this interface.
    async fn disarm(&self) -> Result<()>;

    /// Fetch the most recent `n` entries from the panel's event log.
    async fn get_last_log_entries(&self, n: usize) -> Result<Vec<LogEntry>>;

    /// Release the device connection. Idempotent.
    async fn close(&self) -> Result<()>;
}
