// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::state::ZoneStatus;

/// A single zone sensor entity.
///
/// Reads the zone's record out of the coordinator's current snapshot.
/// Unavailable when the snapshot is missing (failed poll) or the snapshot
/// does not contain this zone.
pub struct ZoneSensor {
    coordinator: Arc<Coordinator>,
    zone_id: u32,
    unique_id: String,
}

impl ZoneSensor {
    pub fn new(coordinator: Arc<Coordinator>, zone_id: u32) -> Self {
        let unique_id = format!("{}-zone-{zone_id}", coordinator.mac());
        Self { coordinator, zone_id, unique_id }
    }

    pub fn zone_id(&self) -> u32 {
        self.zone_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// This zone's record from the current snapshot.
    pub fn status(&self) -> Option<ZoneStatus> {
        self.coordinator.snapshot().and_then(|s| s.zone(self.zone_id).cloned())
    }

    pub fn available(&self) -> bool {
        self.status().is_some()
    }

    /// Open/closed contact state, when available.
    pub fn is_open(&self) -> Option<bool> {
        self.status().map(|z| z.is_open())
    }

    /// Whether the zone reports any problem condition (alarm, low battery,
    /// supervision loss).
    pub fn has_problem(&self) -> Option<bool> {
        self.status().map(|z| z.has_problem())
    }
}
