// MIT License - Copyright (c) 2026 ialarm2mqtt contributors

/// All errors that can occur in the ialarm-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum IAlarmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Command timeout: {command}")]
    CommandTimeout { command: String },

    /// Initial handshake failed or timed out. The host should retry setup
    /// later rather than treat the device as permanently broken.
    #[error("Device not ready: {reason}")]
    NotReady { reason: String },

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },

    /// Disarm was requested without a code. Raised locally, never sent to
    /// the device.
    #[error("A disarm code is required")]
    MissingCode,
}

impl IAlarmError {
    /// Whether this error is transient and the operation should be retried.
    ///
    /// Local validation errors (missing disarm code) are never retryable;
    /// connection-level faults are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IAlarmError::Io(_)
                | IAlarmError::ConnectionTimeout
                | IAlarmError::CommandTimeout { .. }
                | IAlarmError::NotReady { .. }
                | IAlarmError::Disconnected
        )
    }
}

pub type Result<T> = std::result::Result<T, IAlarmError>;
