// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

use std::sync::Arc;

use tracing::debug;

use crate::coordinator::Coordinator;
use crate::error::{IAlarmError, Result};
use crate::state::{AlarmState, LogEntry};

/// Device manufacturer, as reported to the host platform.
pub const MANUFACTURER: &str = "Antifurto365 - Meian";

/// Default entity name.
pub const DEVICE_NAME: &str = "iAlarm";

/// The alarm control panel entity.
///
/// A read-only view over the coordinator's snapshot for state, plus command
/// forwarding to the driver. Holds no state of its own.
pub struct AlarmPanel {
    coordinator: Arc<Coordinator>,
    unique_id: String,
}

impl AlarmPanel {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let unique_id = format!("{}-ialarm_status", coordinator.mac());
        Self { coordinator, unique_id }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Whether the entity has fresh data. False after a failed poll: the
    /// previous record is never reused once a poll has failed.
    pub fn available(&self) -> bool {
        self.coordinator.snapshot().is_some()
    }

    /// The mapped host state, or `None` while the panel is unavailable.
    pub fn state(&self) -> Option<AlarmState> {
        self.coordinator.snapshot().map(|s| s.alarm)
    }

    /// Send the disarm command.
    ///
    /// A non-empty code is required. Validation is local: with a missing or
    /// empty code the driver is never invoked.
    pub async fn disarm(&self, code: Option<&str>) -> Result<()> {
        match code {
            Some(code) if !code.is_empty() => {
                debug!("Disarm requested");
                self.coordinator.client().disarm().await
            }
            _ => Err(IAlarmError::MissingCode),
        }
    }

    /// Send the arm home (stay) command. No code required.
    pub async fn arm_home(&self) -> Result<()> {
        debug!("Arm home requested");
        self.coordinator.client().arm_stay().await
    }

    /// Send the arm away command. No code required.
    pub async fn arm_away(&self) -> Result<()> {
        debug!("Arm away requested");
        self.coordinator.client().arm_away().await
    }

    /// Retrieve the last `max_entries` entries from the panel's event log.
    pub async fn last_log_entries(&self, max_entries: usize) -> Result<Vec<LogEntry>> {
        self.coordinator.client().get_last_log_entries(max_entries).await
    }
}
