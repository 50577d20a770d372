// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

use std::time::Duration;

/// Configuration for connecting to an iAlarm panel.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Panel IP address or hostname
    pub host: String,
    /// Panel TCP port (default: 18034)
    pub port: u16,
    /// Bounded timeout for the initial handshake; exceeding it surfaces
    /// a not-ready condition
    pub connect_timeout: Duration,
    /// Per-command timeout once connected
    pub command_timeout: Duration,
    /// Interval between status polls
    pub scan_interval: Duration,
}

pub const DEFAULT_PORT: u16 = 18034;

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.81".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            scan_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.config.scan_interval = interval;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
