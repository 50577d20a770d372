// MIT License - Copyright (c) 2026 ialarm2mqtt contributors
//
//! # ialarm-bridge
//!
//! Integration layer for iAlarm (Antifurto365 / Meian) alarm panels: a
//! polling [`Coordinator`] that normalizes panel status into an immutable
//! snapshot, entity views that map it to the home-automation host's
//! vocabulary, and a thin TCP driver behind the [`AlarmClient`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ialarm_bridge::{AlarmPanel, ClientConfig, Coordinator, IAlarm};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder()
//!         .host("192.168.1.81")
//!         .build();
//!
//!     let client = Arc::new(IAlarm::new(config.clone()));
//!     let coordinator = Coordinator::connect(client, &config).await?;
//!
//!     let panel = AlarmPanel::new(Arc::clone(&coordinator));
//!     println!("Alarm state: {:?}", panel.state());
//!
//!     panel.arm_away().await?;
//!
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod entity;
pub mod error;
pub mod state;

// Re-exports for convenience
pub use client::AlarmClient;
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_PORT};
pub use coordinator::Coordinator;
pub use driver::IAlarm;
pub use entity::{AlarmPanel, ZoneSensor};
pub use error::{IAlarmError, Result};
pub use state::{
    AlarmState, DeviceStatus, LogEntry, StatusSnapshot, ZoneStatus, ZoneStatusFlags,
};
