// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::AlarmClient;
use crate::config::ClientConfig;
use crate::error::{IAlarmError, Result};
use crate::state::{AlarmState, StatusSnapshot};

/// Periodic polling coordinator for one alarm panel.
///
/// Owns the driver handle and the latest [`StatusSnapshot`]. The snapshot
/// lives in a watch channel and is replaced wholesale on every poll, so
/// entities reading it never observe a partial update. `None` means the
/// panel is currently unavailable (last poll failed, or no poll has
/// succeeded yet).
///
/// At most one coordinator exists per configured device; create it with
/// [`Coordinator::connect`] and tear it down with [`Coordinator::shutdown`].
pub struct Coordinator {
    client: Arc<dyn AlarmClient>,
    mac: String,
    snapshot_tx: watch::Sender<Option<StatusSnapshot>>,
    poll_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Coordinator {
    /// Open the device and start polling.
    ///
    /// The initial handshake (`get_mac`) runs under the configured connect
    /// timeout; on timeout or connection error this returns
    /// [`IAlarmError::NotReady`] so the caller can retry setup later. The
    /// first refresh also happens here, before any entity is served; its
    /// failure is equally a not-ready condition.
    pub async fn connect(client: Arc<dyn AlarmClient>, config: &ClientConfig) -> Result<Arc<Self>> {
        let mac = match timeout(config.connect_timeout, client.get_mac()).await {
            Ok(Ok(mac)) => mac,
            Ok(Err(e)) => {
                return Err(IAlarmError::NotReady { reason: e.to_string() });
            }
            Err(_) => {
                return Err(IAlarmError::NotReady {
                    reason: format!("handshake exceeded {:?} timeout", config.connect_timeout),
                });
            }
        };
        info!("Connected to panel {mac}");

        let (snapshot_tx, _) = watch::channel(None);
        let coordinator = Arc::new(Self {
            client,
            mac,
            snapshot_tx,
            poll_handle: std::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if let Err(e) = coordinator.refresh().await {
            // Release the half-open connection before reporting not-ready
            if let Err(close_err) = coordinator.client.close().await {
                warn!("Error closing panel connection: {close_err}");
            }
            return Err(IAlarmError::NotReady { reason: format!("first refresh failed: {e}") });
        }

        // Background poll task
        let scan_interval = config.scan_interval;
        let poller = Arc::clone(&coordinator);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; the initial refresh already ran
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match poller.refresh().await {
                    Ok(_) => debug!("Status poll completed"),
                    Err(e) => warn!("Status poll failed: {e}"),
                }
            }
        });
        *coordinator.poll_handle.lock().expect("poll handle lock poisoned") = Some(handle);

        Ok(coordinator)
    }

    /// The panel's hardware identifier.
    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// The underlying driver handle, for command forwarding.
    pub fn client(&self) -> &Arc<dyn AlarmClient> {
        &self.client
    }

    /// Fetch status and zone list from the device and publish a fresh
    /// snapshot.
    ///
    /// On failure the published snapshot becomes `None`: entities surface
    /// as unavailable rather than reporting the stale record, and a later
    /// successful poll restores them.
    pub async fn refresh(&self) -> Result<StatusSnapshot> {
        let result = async {
            let status = self.client.get_status().await?;
            let zones = self.client.get_zone_status().await?;
            Ok(StatusSnapshot { alarm: AlarmState::from_device(status), zones })
        }
        .await;

        match result {
            Ok(snapshot) => {
                self.snapshot_tx.send_replace(Some(snapshot.clone()));
                Ok(snapshot)
            }
            Err(e) => {
                self.snapshot_tx.send_replace(None);
                Err(e)
            }
        }
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// The current snapshot, or `None` while the panel is unavailable.
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Stop polling and release the device connection.
    ///
    /// Idempotent: the connection is closed exactly once no matter how many
    /// times this is called, and regardless of whether any poll succeeded.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down coordinator for panel {}", self.mac);
        if let Some(handle) = self.poll_handle.lock().expect("poll handle lock poisoned").take() {
            handle.abort();
        }
        if let Err(e) = self.client.close().await {
            warn!("Error closing panel connection: {e}");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.poll_handle.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
