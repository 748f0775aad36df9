//! Transport abstraction for serial endpoints
//!
//! The bridge engine only depends on the [`Transport`] and
//! [`TransportOpener`] traits defined here:
//!
//! - [`serial::SerialTransport`] - real serial ports via tokio-serial (requires `serial` feature)
//! - [`crate::test_utils::MockTransport`] - in-memory transport for tests
//!
//! A transport is used full duplex: one reader task and one writer task call
//! into it concurrently, so every method takes `&self`.
//!
//! # Feature Requirements
//!
//! - `serial`: builds the tokio-serial backend and [`list_ports`]

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialTransport, SerialTransportOpener};

mod ports;

pub use ports::PortInfo;

#[cfg(feature = "serial")]
pub use ports::list_ports;

use crate::config::EndpointConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// An open serial connection
///
/// Reads and writes are cancelled by dropping their futures; implementations
/// must leave the transport usable when that happens.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read whatever is available into `buf`
    ///
    /// Returns the number of bytes read. `Ok(0)` means "no data yet" and is
    /// not end-of-stream.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Flush buffered output
    async fn flush(&self) -> Result<()>;

    /// Release the port; calling it again is a no-op
    async fn close(&self) -> Result<()>;

    /// Name for logging (usually the port name)
    fn name(&self) -> &str;
}

/// Factory that opens a transport for an endpoint configuration
#[async_trait]
pub trait TransportOpener: Send + Sync {
    /// Open the endpoint described by `config`
    async fn open(&self, config: &EndpointConfig) -> Result<Arc<dyn Transport>>;
}
