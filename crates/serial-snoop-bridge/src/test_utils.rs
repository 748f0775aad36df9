//! In-memory transports for exercising the engine without hardware
//!
//! [`MockTransport`] replays scripted reads and records every write;
//! [`MockTransportOpener`] hands out one mock per port name and can be told
//! to fail specific opens.
//!
//! # Example
//!
//! ```rust,ignore
//! use serial_snoop_bridge::test_utils::{MockTransportOpener, WriteBehavior};
//!
//! let opener = Arc::new(MockTransportOpener::new());
//! let up = opener.register("UP");
//! let down = opener.register("DOWN");
//! down.set_write_behavior(WriteBehavior::Stall);
//! up.push_read(b"hello".to_vec());
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

use crate::config::EndpointConfig;
use crate::error::{BridgeError, Result};
use crate::transport::{Transport, TransportOpener};

/// One scripted read result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    /// Return these bytes
    Data(Vec<u8>),
    /// Return zero bytes ("no data yet")
    Empty,
    /// Fail the read with this reason
    Error(String),
}

/// How a [`MockTransport`] treats writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBehavior {
    /// Record and succeed
    Normal,
    /// Never complete
    Stall,
    /// Fail with a write error
    Fail,
    /// Sleep, then record and succeed
    Delay(Duration),
}

/// Scriptable in-memory transport
///
/// Reads pend until a step is scripted; once the script is exhausted reads
/// pend again, like an idle serial line.
pub struct MockTransport {
    name: String,
    reads: Mutex<VecDeque<ReadStep>>,
    read_ready: Notify,
    written: Mutex<Vec<Vec<u8>>>,
    write_count: watch::Sender<usize>,
    write_behavior: Mutex<WriteBehavior>,
    flush_count: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    /// Create an open mock transport
    pub fn new(name: impl Into<String>) -> Self {
        let (write_count, _) = watch::channel(0);
        Self {
            name: name.into(),
            reads: Mutex::new(VecDeque::new()),
            read_ready: Notify::new(),
            written: Mutex::new(Vec::new()),
            write_count,
            write_behavior: Mutex::new(WriteBehavior::Normal),
            flush_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Script a read returning `data`
    pub fn push_read(&self, data: impl Into<Vec<u8>>) {
        self.push_step(ReadStep::Data(data.into()));
    }

    /// Script an arbitrary read step
    pub fn push_step(&self, step: ReadStep) {
        self.reads.lock().push_back(step);
        self.read_ready.notify_one();
    }

    /// Change how subsequent writes behave
    pub fn set_write_behavior(&self, behavior: WriteBehavior) {
        *self.write_behavior.lock() = behavior;
    }

    /// Every successful write, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    /// All written bytes concatenated
    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.lock().concat()
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        *self.write_count.borrow()
    }

    /// Number of flush calls
    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    /// Scripted reads not consumed yet
    pub fn pending_reads(&self) -> usize {
        self.reads.lock().len()
    }

    /// Wait until at least `n` writes have succeeded
    pub async fn wait_for_writes(&self, n: usize) {
        let mut rx = self.write_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// True once [`Transport::close`] was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BridgeError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn record_write(&self, data: &[u8]) {
        let mut written = self.written.lock();
        written.push(data.to_vec());
        self.write_count.send_replace(written.len());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            self.ensure_open()?;

            let step = self.reads.lock().pop_front();
            match step {
                Some(ReadStep::Data(mut data)) => {
                    if data.len() > buf.len() {
                        let rest = data.split_off(buf.len());
                        self.reads.lock().push_front(ReadStep::Data(rest));
                    }
                    buf[..data.len()].copy_from_slice(&data);
                    return Ok(data.len());
                }
                Some(ReadStep::Empty) => return Ok(0),
                Some(ReadStep::Error(reason)) => {
                    return Err(BridgeError::ReadError {
                        port: self.name.clone(),
                        reason,
                    })
                }
                None => self.read_ready.notified().await,
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let behavior = *self.write_behavior.lock();
        match behavior {
            WriteBehavior::Normal => {}
            WriteBehavior::Stall => std::future::pending::<()>().await,
            WriteBehavior::Fail => {
                return Err(BridgeError::WriteError {
                    port: self.name.clone(),
                    reason: "scripted write failure".to_string(),
                })
            }
            WriteBehavior::Delay(delay) => tokio::time::sleep(delay).await,
        }

        self.record_write(data);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("writes", &self.write_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opener handing out [`MockTransport`]s by port name
#[derive(Default)]
pub struct MockTransportOpener {
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    failing: Mutex<HashSet<String>>,
    open_delay: Mutex<Option<Duration>>,
    opened: Mutex<Vec<EndpointConfig>>,
    open_count: AtomicUsize,
}

impl MockTransportOpener {
    /// Create an opener with no registered ports
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the mock for `port`, for scripting before start
    pub fn register(&self, port: &str) -> Arc<MockTransport> {
        self.transports
            .lock()
            .entry(port.to_string())
            .or_insert_with(|| Arc::new(MockTransport::new(port)))
            .clone()
    }

    /// Make every open of `port` fail
    pub fn fail_open(&self, port: &str) {
        self.failing.lock().insert(port.to_string());
    }

    /// Make every open take `delay` before it completes
    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = Some(delay);
    }

    /// The mock handed out for `port`, if any
    pub fn transport(&self, port: &str) -> Option<Arc<MockTransport>> {
        self.transports.lock().get(port).cloned()
    }

    /// Number of open attempts
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Configurations of successful opens, in order
    pub fn opened(&self) -> Vec<EndpointConfig> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl TransportOpener for MockTransportOpener {
    async fn open(&self, config: &EndpointConfig) -> Result<Arc<dyn Transport>> {
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&config.port_name) {
            return Err(BridgeError::PortOpenFailed {
                port: config.port_name.clone(),
                reason: "scripted open failure".to_string(),
            });
        }

        let transport = self.register(&config.port_name);
        self.opened.lock().push(config.clone());
        Ok(transport)
    }
}
