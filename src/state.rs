// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Raw alarm status codes reported by the panel.
///
/// The panel reports its status as a small integer. Anything outside the
/// known range is preserved as `Other` so the mapping to [`AlarmState`]
/// stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// 0 - Fully armed
    ArmedAway,
    /// 1 - Disarmed
    Disarmed,
    /// 2 - Partially armed (stay/home)
    ArmedStay,
    /// 3 - Alarm cancelled
    Cancel,
    /// 4 - Alarm triggered
    Triggered,
    /// Any code the panel reports that we do not recognize
    Other(u8),
}

impl DeviceStatus {
    /// Parse the raw status integer from the panel.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::ArmedAway,
            1 => Self::Disarmed,
            2 => Self::ArmedStay,
            3 => Self::Cancel,
            4 => Self::Triggered,
            other => Self::Other(other),
        }
    }

    /// The wire integer for this status.
    pub fn code(&self) -> u8 {
        match self {
            Self::ArmedAway => 0,
            Self::Disarmed => 1,
            Self::ArmedStay => 2,
            Self::Cancel => 3,
            Self::Triggered => 4,
            Self::Other(c) => *c,
        }
    }
}

/// Alarm state in the host platform's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    ArmedAway,
    ArmedHome,
    Disarmed,
    Triggered,
    /// Fallback for device codes with no host equivalent (e.g. Cancel)
    Unknown,
}

impl AlarmState {
    /// Map a device status code to the host vocabulary.
    ///
    /// Total: every device code maps to exactly one host state, with
    /// `Unknown` as the fallback.
    pub fn from_device(status: DeviceStatus) -> Self {
        match status {
            DeviceStatus::ArmedAway => Self::ArmedAway,
            DeviceStatus::ArmedStay => Self::ArmedHome,
            DeviceStatus::Disarmed => Self::Disarmed,
            DeviceStatus::Triggered => Self::Triggered,
            DeviceStatus::Cancel | DeviceStatus::Other(_) => Self::Unknown,
        }
    }

    /// The host platform's canonical state string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArmedAway => "armed_away",
            Self::ArmedHome => "armed_home",
            Self::Disarmed => "disarmed",
            Self::Triggered => "triggered",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Zone status flags, parsed from the per-zone status bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ZoneStatusFlags: u8 {
        /// Zone is provisioned (a zero mask means the zone is unused)
        const IN_USE      = 0b0000_0001;
        /// Zone is in alarm
        const ALARM       = 0b0000_0010;
        /// Zone is bypassed
        const BYPASS      = 0b0000_0100;
        /// Zone fault: contact open / sensor tripped
        const FAULT       = 0b0000_1000;
        /// Wireless sensor battery low
        const LOW_BATTERY = 0b0001_0000;
        /// Wireless sensor supervision lost
        const LOSS        = 0b0010_0000;
    }
}

impl ZoneStatusFlags {
    /// Parse the raw bitmask from the panel, discarding unknown bits.
    pub fn from_mask(mask: u8) -> Self {
        Self::from_bits_truncate(mask)
    }
}

/// Status of a single zone, as reported in one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneStatus {
    /// Zone number (1-indexed)
    pub id: u32,
    /// Zone label as configured on the panel (may be empty)
    pub name: String,
    pub flags: ZoneStatusFlags,
}

impl ZoneStatus {
    pub fn new(id: u32, name: impl Into<String>, flags: ZoneStatusFlags) -> Self {
        Self { id, name: name.into(), flags }
    }

    pub fn in_use(&self) -> bool { self.flags.contains(ZoneStatusFlags::IN_USE) }
    pub fn is_open(&self) -> bool { self.flags.contains(ZoneStatusFlags::FAULT) }
    pub fn is_alarm(&self) -> bool { self.flags.contains(ZoneStatusFlags::ALARM) }
    pub fn is_bypassed(&self) -> bool { self.flags.contains(ZoneStatusFlags::BYPASS) }
    pub fn is_low_battery(&self) -> bool { self.flags.contains(ZoneStatusFlags::LOW_BATTERY) }
    pub fn is_lost(&self) -> bool { self.flags.contains(ZoneStatusFlags::LOSS) }

    /// Any condition that should surface as a problem on the host side.
    pub fn has_problem(&self) -> bool {
        self.flags
            .intersects(ZoneStatusFlags::ALARM | ZoneStatusFlags::LOW_BATTERY | ZoneStatusFlags::LOSS)
    }
}

/// One entry from the panel's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Event time as reported by the panel (panel-local, "YYYY-MM-DD HH:MM:SS")
    pub time: String,
    /// Originating zone/area number (0 for system events)
    pub area: u32,
    /// Event description
    pub event: String,
}

/// The status record produced by one successful poll cycle.
///
/// Immutable after construction; the coordinator replaces it wholesale so
/// entities never observe a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub alarm: AlarmState,
    pub zones: Vec<ZoneStatus>,
}

impl StatusSnapshot {
    /// Look up a zone by its 1-indexed ID.
    pub fn zone(&self, id: u32) -> Option<&ZoneStatus> {
        self.zones.iter().find(|z| z.id == id)
    }
}
