//! Configuration types for the serial bridge
//!
//! This module provides the per-endpoint line settings used to open a
//! transport and the engine tunables (queue capacity, write deadline, read
//! buffer size). Configuration is built in memory and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Default baud rate for a freshly created endpoint
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default number of data bits
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Capacity of every frame queue in a session
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Deadline for a single write (plus flush) to a destination
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2000;

/// Size of the per-read buffer; bounds the size of a frame
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Pause after a zero-byte read before reading again
pub const DEFAULT_IDLE_READ_BACKOFF_MS: u64 = 10;

/// Parity checking mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
    /// Parity bit always set
    Mark,
    /// Parity bit always cleared
    Space,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// One and a half stop bits
    OnePointFive,
    /// Two stop bits
    Two,
}

/// Flow control handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handshake {
    /// No flow control
    #[default]
    None,
    /// Software flow control
    XOnXOff,
    /// Hardware RTS/CTS flow control
    RequestToSend,
    /// Hardware and software flow control combined
    RequestToSendXOnXOff,
}

impl Handshake {
    /// Whether the RTS line is driven by the flow control itself
    pub fn uses_rts(&self) -> bool {
        matches!(
            self,
            Handshake::RequestToSend | Handshake::RequestToSendXOnXOff
        )
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
            Parity::Mark => "mark",
            Parity::Space => "space",
        };
        f.write_str(s)
    }
}

impl FromStr for Parity {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            "mark" | "m" => Ok(Parity::Mark),
            "space" | "s" => Ok(Parity::Space),
            other => Err(BridgeError::InvalidConfig(format!("unknown parity '{}'", other))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        f.write_str(s)
    }
}

impl FromStr for StopBits {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "one" => Ok(StopBits::One),
            "1.5" | "one_point_five" | "onepointfive" => Ok(StopBits::OnePointFive),
            "2" | "two" => Ok(StopBits::Two),
            other => Err(BridgeError::InvalidConfig(format!(
                "unknown stop bits '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Handshake::None => "none",
            Handshake::XOnXOff => "xonxoff",
            Handshake::RequestToSend => "rts",
            Handshake::RequestToSendXOnXOff => "rts-xonxoff",
        };
        f.write_str(s)
    }
}

impl FromStr for Handshake {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Handshake::None),
            "xonxoff" | "xon_xoff" | "software" => Ok(Handshake::XOnXOff),
            "rts" | "request_to_send" | "hardware" => Ok(Handshake::RequestToSend),
            "rts-xonxoff" | "request_to_send_xon_xoff" => Ok(Handshake::RequestToSendXOnXOff),
            other => Err(BridgeError::InvalidConfig(format!(
                "unknown handshake '{}'",
                other
            ))),
        }
    }
}

/// Line settings for one serial endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Port identifier (e.g., /dev/ttyUSB0, COM3)
    pub port_name: String,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits per character (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity mode
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Flow control handshake
    #[serde(default)]
    pub handshake: Handshake,

    /// Assert DTR after opening
    #[serde(default)]
    pub dtr_enable: bool,

    /// Assert RTS after opening
    #[serde(default)]
    pub rts_enable: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

impl EndpointConfig {
    /// Create an endpoint with default line settings
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: StopBits::One,
            handshake: Handshake::None,
            dtr_enable: false,
            rts_enable: false,
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set data bits
    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set parity
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set stop bits
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set flow control
    pub fn with_handshake(mut self, handshake: Handshake) -> Self {
        self.handshake = handshake;
        self
    }

    /// Set the DTR and RTS line states
    pub fn with_lines(mut self, dtr_enable: bool, rts_enable: bool) -> Self {
        self.dtr_enable = dtr_enable;
        self.rts_enable = rts_enable;
        self
    }

    /// Copy every line setting except the port name
    pub fn for_port(&self, port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..self.clone()
        }
    }

    /// Check the values a transport cannot be opened with
    pub fn validate(&self) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "port name must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(BridgeError::InvalidConfig(format!(
                "baud rate for {} must be positive",
                self.port_name
            )));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(BridgeError::InvalidConfig(format!(
                "data bits for {} must be between 5 and 8, got {}",
                self.port_name, self.data_bits
            )));
        }
        Ok(())
    }
}

/// Validate a session's endpoints: each must be valid and no port may be
/// used twice. Port names compare case-insensitively (COM3 == com3).
pub fn validate_endpoints(
    upstream: &EndpointConfig,
    downstream: &EndpointConfig,
    mirror: Option<&EndpointConfig>,
) -> Result<()> {
    upstream.validate()?;
    downstream.validate()?;
    if let Some(mirror) = mirror {
        mirror.validate()?;
    }

    let mut seen: Vec<&str> = Vec::with_capacity(3);
    for endpoint in [Some(upstream), Some(downstream), mirror].into_iter().flatten() {
        let name = endpoint.port_name.trim();
        if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            return Err(BridgeError::DuplicatePort(name.to_string()));
        }
        seen.push(name);
    }
    Ok(())
}

/// Engine tunables shared by every queue and loop of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Capacity of each frame queue, in frames
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deadline for one write and its flush
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,

    /// Per-read buffer size, in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Pause after a zero-byte read
    #[serde(with = "humantime_serde", default = "default_idle_read_backoff")]
    pub idle_read_backoff: Duration,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_write_timeout() -> Duration {
    Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS)
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_idle_read_backoff() -> Duration {
    Duration::from_millis(DEFAULT_IDLE_READ_BACKOFF_MS)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: default_write_timeout(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            idle_read_backoff: default_idle_read_backoff(),
        }
    }
}

impl BridgeConfig {
    /// Set queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set write deadline
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set idle back-off after empty reads
    pub fn with_idle_read_backoff(mut self, backoff: Duration) -> Self {
        self.idle_read_backoff = backoff;
        self
    }

    /// Reject zero-sized queues, buffers and deadlines
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "read buffer size must be positive".to_string(),
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "write timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
