//! Serial bridge engine for serial-snoop
//!
//! Relays bytes between two serial endpoints in both directions while
//! optionally tee-ing all traffic to a third "mirror" port for passive
//! observation. The engine is payload-agnostic: it moves opaque frames and
//! reports counters and lifecycle events to observers.
//!
//! # Architecture
//!
//! The engine works in three layers:
//!
//! 1. **Transport** - [`Transport`] / [`TransportOpener`], backed by
//!    tokio-serial or by the in-memory mocks in [`test_utils`]
//! 2. **Relay** - per-direction reader and writer tasks joined by bounded,
//!    drop-on-full frame queues
//! 3. **Observers** - [`BridgeObserver`] implementations such as
//!    [`RelayFileLogger`], [`LogHistory`] and [`DiagnosticsLogger`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // Cargo.toml: serial-snoop-bridge = { version = "0.1", features = ["serial"] }
//! use serial_snoop_bridge::{
//!     EndpointConfig, EventForwarder, SerialBridge, SerialTransportOpener,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (forwarder, mut events) = EventForwarder::channel();
//!     let bridge = SerialBridge::new(Arc::new(SerialTransportOpener), Arc::new(forwarder));
//!
//!     let upstream = EndpointConfig::new("/dev/ttyUSB0").with_baud_rate(115_200);
//!     let downstream = upstream.for_port("/dev/ttyUSB1");
//!     bridge.start(upstream, downstream, None).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `serial` - tokio-serial transport and [`list_ports`]
//!
//! # Overload
//!
//! Readers never wait on a full queue. A frame that does not fit is dropped
//! and counted in [`BridgeStats`]; the source port keeps being drained.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Core types
pub mod config;
pub mod error;
pub mod frame;
pub mod queue;
pub mod stats;

// Engine
pub mod bridge;
mod diagnostics;
pub mod observer;
mod relay;
pub mod transport;

// Side observers
pub mod diagnostics_log;
pub mod hexdump;
pub mod relay_log;

// Testing utilities
pub mod test_utils;

pub use bridge::{BridgeState, SerialBridge};
pub use config::{
    validate_endpoints, BridgeConfig, EndpointConfig, Handshake, Parity, StopBits,
    DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS, DEFAULT_IDLE_READ_BACKOFF_MS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_TIMEOUT_MS,
};
pub use error::{BridgeError, Result};
pub use frame::{Direction, Frame};
pub use observer::{
    BridgeEvent, BridgeObserver, EventForwarder, NoopObserver, ObserverGroup, StopFault,
};
pub use queue::{frame_queue, FrameReceiver, FrameSender, QueueGauge, TryPushError};
pub use stats::{BridgeStats, RelayCounters};
pub use transport::{PortInfo, Transport, TransportOpener};

#[cfg(feature = "serial")]
pub use transport::{list_ports, SerialTransport, SerialTransportOpener};

pub use diagnostics_log::{
    DiagnosticsLogger, DEFAULT_DIAGNOSTICS_INTERVAL, DEFAULT_DIAGNOSTICS_PATH,
};
pub use hexdump::{to_ascii, to_hex, DEFAULT_MAX_DUMP_BYTES};
pub use relay_log::{
    default_save_file_name, LogEntry, LogHistory, RelayFileLogger, DEFAULT_HISTORY_CAPACITY,
};
pub use test_utils::{MockTransport, MockTransportOpener};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_BAUD_RATE, 9600);
        assert_eq!(DEFAULT_QUEUE_CAPACITY, 1024);
        assert_eq!(DEFAULT_WRITE_TIMEOUT_MS, 2000);
        assert_eq!(DEFAULT_READ_BUFFER_SIZE, 4096);
        assert_eq!(DEFAULT_MAX_DUMP_BYTES, 256);
        assert_eq!(DEFAULT_HISTORY_CAPACITY, 10_000);
    }
}
