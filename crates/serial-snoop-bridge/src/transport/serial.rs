//! Serial port transport
//!
//! Async serial communication via tokio-serial. The stream is split into a
//! read half and a write half so the reader loop and the writer loop of a
//! session never contend for the same lock.

use crate::config::{EndpointConfig, Handshake, Parity, StopBits};
use crate::error::{BridgeError, Result};
use crate::transport::{Transport, TransportOpener};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace};

/// An open serial port, usable full duplex
pub struct SerialTransport {
    /// Port name, also used for logging
    name: String,

    /// Read half (None once closed)
    reader: Mutex<Option<ReadHalf<SerialStream>>>,

    /// Write half (None once closed)
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
}

impl SerialTransport {
    /// Open a serial port with the given line settings
    pub fn open(config: &EndpointConfig) -> Result<Self> {
        let port = config.port_name.as_str();
        info!(
            port,
            baud = config.baud_rate,
            data_bits = config.data_bits,
            parity = %config.parity,
            stop_bits = %config.stop_bits,
            handshake = %config.handshake,
            "Opening serial port"
        );

        let mut stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(data_bits(config)?)
            .parity(parity(config)?)
            .stop_bits(stop_bits(config)?)
            .flow_control(flow_control(config)?)
            .open_native_async()
            .map_err(|e| open_error(port, e))?;

        stream
            .write_data_terminal_ready(config.dtr_enable)
            .map_err(|e| open_error(port, e))?;

        // With hardware flow control the driver owns RTS
        if !config.handshake.uses_rts() {
            stream
                .write_request_to_send(config.rts_enable)
                .map_err(|e| open_error(port, e))?;
        }

        let (reader, writer) = tokio::io::split(stream);
        info!(port, "Serial port open");

        Ok(Self {
            name: config.port_name.clone(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        })
    }
}

fn open_error(port: &str, err: tokio_serial::Error) -> BridgeError {
    match BridgeError::from(err) {
        BridgeError::PortOpenFailed { reason, .. } => BridgeError::PortOpenFailed {
            port: port.to_string(),
            reason,
        },
        BridgeError::Io(e) => BridgeError::PortOpenFailed {
            port: port.to_string(),
            reason: e.to_string(),
        },
        other => other,
    }
}

fn unsupported(config: &EndpointConfig, setting: &str) -> BridgeError {
    BridgeError::UnsupportedSetting {
        port: config.port_name.clone(),
        setting: setting.to_string(),
    }
}

fn data_bits(config: &EndpointConfig) -> Result<tokio_serial::DataBits> {
    match config.data_bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(unsupported(config, &format!("{} data bits", other))),
    }
}

fn parity(config: &EndpointConfig) -> Result<tokio_serial::Parity> {
    match config.parity {
        Parity::None => Ok(tokio_serial::Parity::None),
        Parity::Odd => Ok(tokio_serial::Parity::Odd),
        Parity::Even => Ok(tokio_serial::Parity::Even),
        Parity::Mark | Parity::Space => {
            Err(unsupported(config, &format!("{} parity", config.parity)))
        }
    }
}

fn stop_bits(config: &EndpointConfig) -> Result<tokio_serial::StopBits> {
    match config.stop_bits {
        StopBits::One => Ok(tokio_serial::StopBits::One),
        StopBits::Two => Ok(tokio_serial::StopBits::Two),
        StopBits::OnePointFive => Err(unsupported(config, "1.5 stop bits")),
    }
}

fn flow_control(config: &EndpointConfig) -> Result<tokio_serial::FlowControl> {
    match config.handshake {
        Handshake::None => Ok(tokio_serial::FlowControl::None),
        Handshake::XOnXOff => Ok(tokio_serial::FlowControl::Software),
        Handshake::RequestToSend => Ok(tokio_serial::FlowControl::Hardware),
        Handshake::RequestToSendXOnXOff => {
            Err(unsupported(config, "combined RTS/CTS and XON/XOFF handshake"))
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| BridgeError::Closed(self.name.clone()))?;

        match reader.read(buf).await {
            Ok(n) => {
                trace!(port = %self.name, bytes = n, "Read from serial port");
                Ok(n)
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // No data available yet
                Ok(0)
            }
            Err(e) => {
                error!(port = %self.name, error = %e, "Serial read error");
                Err(BridgeError::ReadError {
                    port: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| BridgeError::Closed(self.name.clone()))?;

        writer.write_all(data).await.map_err(|e| {
            error!(port = %self.name, error = %e, "Serial write error");
            BridgeError::WriteError {
                port: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }

    async fn flush(&self) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| BridgeError::Closed(self.name.clone()))?;

        writer.flush().await.map_err(|e| BridgeError::WriteError {
            port: self.name.clone(),
            reason: format!("Flush failed: {}", e),
        })
    }

    async fn close(&self) -> Result<()> {
        let reader = self.reader.lock().await.take();
        let writer = self.writer.lock().await.take();

        if reader.is_some() || writer.is_some() {
            // Dropping both halves releases the file descriptor
            drop(reader);
            drop(writer);
            info!(port = %self.name, "Closed serial port");
        } else {
            debug!(port = %self.name, "Serial port already closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.name)
            .finish()
    }
}

/// Opens [`SerialTransport`]s; the production [`TransportOpener`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialTransportOpener;

#[async_trait]
impl TransportOpener for SerialTransportOpener {
    async fn open(&self, config: &EndpointConfig) -> Result<Arc<dyn Transport>> {
        let transport = SerialTransport::open(config)?;
        Ok(Arc::new(transport))
    }
}
