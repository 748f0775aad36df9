//! Error types for serial bridge operations
//!
//! Covers the whole failure taxonomy of a bridge session: transport open
//! failures, read/write faults, write timeouts, lifecycle misuse and invalid
//! configuration. Queue overflow and cancellation are not errors and have no
//! variant here.

use thiserror::Error;

/// Main error type for serial bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Transport Errors =====
    /// Serial port not found
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port open failed
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port name
        port: String,
        /// Failure reason
        reason: String,
    },

    /// The serial backend cannot express a requested line setting
    #[error("Unsupported setting for serial port {port}: {setting}")]
    UnsupportedSetting {
        /// Port name
        port: String,
        /// Human readable description of the setting
        setting: String,
    },

    /// Serial read error
    #[error("Serial read error on {port}: {reason}")]
    ReadError {
        /// Port name
        port: String,
        /// Failure reason
        reason: String,
    },

    /// Serial write error
    #[error("Serial write error on {port}: {reason}")]
    WriteError {
        /// Port name
        port: String,
        /// Failure reason
        reason: String,
    },

    /// A write did not complete within the configured deadline
    #[error("Write to {port} timed out after {timeout_ms}ms")]
    WriteTimeout {
        /// Port name
        port: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Transport already closed
    #[error("Serial port {0} is closed")]
    Closed(String),

    // ===== Session Errors =====
    /// Start called while a session is active
    #[error("Serial bridge is already running")]
    BridgeAlreadyRunning,

    /// Start called on an engine whose session has ended
    #[error("Serial bridge session has ended; create a new bridge to restart")]
    SessionEnded,

    /// A relay task panicked or was aborted
    #[error("Relay task failed: {0}")]
    TaskFailed(String),

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The same port was selected for more than one endpoint
    #[error("Port {0} is used by more than one endpoint")]
    DuplicatePort(String),

    // ===== General Errors =====
    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Check if this error came from opening a transport
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::PortNotFound(_)
                | BridgeError::PortOpenFailed { .. }
                | BridgeError::UnsupportedSetting { .. }
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::PortNotFound(_) => "PORT_NOT_FOUND",
            BridgeError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            BridgeError::UnsupportedSetting { .. } => "UNSUPPORTED_SETTING",
            BridgeError::ReadError { .. } => "READ_ERROR",
            BridgeError::WriteError { .. } => "WRITE_ERROR",
            BridgeError::WriteTimeout { .. } => "WRITE_TIMEOUT",
            BridgeError::Closed(_) => "CLOSED",
            BridgeError::BridgeAlreadyRunning => "BRIDGE_ALREADY_RUNNING",
            BridgeError::SessionEnded => "SESSION_ENDED",
            BridgeError::TaskFailed(_) => "TASK_FAILED",
            BridgeError::InvalidConfig(_) => "INVALID_CONFIG",
            BridgeError::DuplicatePort(_) => "DUPLICATE_PORT",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => BridgeError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                BridgeError::Io(std::io::Error::new(kind, err.description))
            }
            _ => BridgeError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}
