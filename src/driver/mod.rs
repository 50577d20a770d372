// MIT License - Copyright (c) 2026 ialarm2mqtt contributors
//
// Thin TCP client for iAlarm (Meian) panels. This module stands in for the
// externally maintained device driver: it covers exactly the operation
// surface the integration needs and nothing more.

pub mod protocol;

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::AlarmClient;
use crate::config::ClientConfig;
use crate::error::{IAlarmError, Result};
use crate::state::{DeviceStatus, LogEntry, ZoneStatus, ZoneStatusFlags};

/// Device status codes accepted by SetAlarmStatus.
const SET_ARM_AWAY: u8 = 0;
const SET_DISARM: u8 = 1;
const SET_ARM_STAY: u8 = 2;

/// TCP client for an iAlarm panel.
///
/// Holds at most one socket; all commands serialize on an internal lock so
/// there is a single outstanding network operation at a time. On any I/O
/// error the socket is dropped and the next command reconnects.
pub struct IAlarm {
    config: ClientConfig,
    stream: Mutex<Option<TcpStream>>,
    seq: AtomicU32,
}

impl IAlarm {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            seq: AtomicU32::new(0),
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        debug!("Connecting to panel at {addr}");
        match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(IAlarmError::Io(e)),
            Err(_) => Err(IAlarmError::ConnectionTimeout),
        }
    }

    /// Send one request and read the matching response.
    ///
    /// Takes the socket lock for the whole exchange; reconnects if there is
    /// no live socket. Any failure tears the socket down so the next command
    /// starts fresh.
    async fn exchange(&self, command: &str, fields: &[(&str, String)]) -> Result<String> {
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let stream = guard.as_mut().ok_or(IAlarmError::Disconnected)?;

        let payload = protocol::build_request(command, fields);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let frame = protocol::encode_frame(&payload, seq);

        let result = timeout(self.config.command_timeout, async {
            stream.write_all(&frame).await?;

            let mut header = [0u8; 4];
            stream.read_exact(&mut header).await?;
            if &header != protocol::HEADER {
                return Err(IAlarmError::InvalidResponse {
                    details: "bad response header".to_string(),
                });
            }
            let mut length_block = [0u8; 8];
            stream.read_exact(&mut length_block).await?;
            let len = protocol::parse_length(&length_block)?;

            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await?;
            let mut trailer = [0u8; 4];
            stream.read_exact(&mut trailer).await?;

            protocol::decode_payload(&body)
        })
        .await;

        match result {
            Ok(Ok(document)) => Ok(document),
            Ok(Err(e)) => {
                *guard = None;
                Err(e)
            }
            Err(_) => {
                *guard = None;
                Err(IAlarmError::CommandTimeout { command: command.to_string() })
            }
        }
    }

    /// Set the panel's alarm status (arm/disarm).
    async fn set_status(&self, code: u8) -> Result<()> {
        let fields = [("DevStatus", format!("TYP,NONE|{code}"))];
        self.exchange("SetAlarmStatus", &fields).await?;
        Ok(())
    }
}

#[async_trait]
impl AlarmClient for IAlarm {
    async fn get_mac(&self) -> Result<String> {
        let document = self.exchange("GetNet", &[]).await?;
        let raw = protocol::extract_tag(&document, "Mac").ok_or_else(|| {
            IAlarmError::InvalidResponse { details: "missing <Mac> in GetNet response".to_string() }
        })?;
        let mac = protocol::parse_typed_value(raw).trim();
        if mac.is_empty() {
            return Err(IAlarmError::InvalidResponse {
                details: "empty MAC in GetNet response".to_string(),
            });
        }
        Ok(mac.to_uppercase())
    }

    async fn get_status(&self) -> Result<DeviceStatus> {
        let document = self.exchange("GetAlarmStatus", &[]).await?;
        let code = protocol::extract_int(&document, "DevStatus")?;
        Ok(DeviceStatus::from_code(code as u8))
    }

    async fn get_zone_status(&self) -> Result<Vec<ZoneStatus>> {
        let mut zones = Vec::new();
        let mut offset = 0usize;

        loop {
            let fields = [("Offset", format!("S32,0,0|{offset}"))];
            let document = self.exchange("GetByWay", &fields).await?;
            let total = protocol::extract_int(&document, "Total")? as usize;
            let entries = protocol::extract_list(&document);
            if entries.is_empty() {
                break;
            }

            for raw in &entries {
                let mask: u8 = raw.trim().parse().map_err(|_| IAlarmError::InvalidResponse {
                    details: format!("bad zone mask: {raw}"),
                })?;
                let id = (zones.len() + 1) as u32;
                zones.push(ZoneStatus::new(id, "", ZoneStatusFlags::from_mask(mask)));
            }

            offset = zones.len();
            if offset >= total {
                break;
            }
        }

        Ok(zones)
    }

    async fn arm_away(&self) -> Result<()> {
        debug!("Sending arm away");
        self.set_status(SET_ARM_AWAY).await
    }

    async fn arm_stay(&self) -> Result<()> {
        debug!("Sending arm stay");
        self.set_status(SET_ARM_STAY).await
    }

    async fn disarm(&self) -> Result<()> {
        debug!("Sending disarm");
        self.set_status(SET_DISARM).await
    }

    async fn get_last_log_entries(&self, n: usize) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        let mut offset = 0usize;

        while entries.len() < n {
            let fields = [("Offset", format!("S32,0,0|{offset}"))];
            let document = self.exchange("GetLog", &fields).await?;
            let total = protocol::extract_int(&document, "Total")? as usize;
            let page = protocol::extract_list(&document);
            if page.is_empty() {
                break;
            }

            for raw in &page {
                // Entry format: "<time>,<area>,<event>"
                let mut parts = raw.splitn(3, ',');
                let (time, area, event) = match (parts.next(), parts.next(), parts.next()) {
                    (Some(t), Some(a), Some(e)) => (t, a, e),
                    _ => {
                        warn!("Skipping malformed log entry: {raw}");
                        continue;
                    }
                };
                entries.push(LogEntry {
                    time: time.trim().to_string(),
                    area: area.trim().parse().unwrap_or(0),
                    event: event.trim().to_string(),
                });
                if entries.len() == n {
                    break;
                }
            }

            offset += page.len();
            if offset >= total {
                break;
            }
        }

        Ok(entries)
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            debug!("Closing panel connection");
            if let Err(e) = stream.shutdown().await {
                warn!("Error shutting down panel socket: {e}");
            }
        }
        Ok(())
    }
}
