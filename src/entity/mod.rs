// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

//! Host-facing entities: read-only views over the coordinator's current
//! snapshot, plus command forwarding for the alarm panel itself.

pub mod alarm;
pub mod zone;

pub use alarm::AlarmPanel;
pub use zone::ZoneSensor;
