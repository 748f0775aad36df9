//! SerialBridge - the bridge engine
//!
//! Opens two serial endpoints (plus an optional mirror) and relays every
//! frame read on one side to the other, in both directions at once.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  reader   ┌──────────────┐  writer   ┌──────────────┐
//! │  Upstream  │──────────►│ queue (TX)   │──────────►│  Downstream  │
//! │            │◄──────────│ queue (RX)   │◄──────────│              │
//! └────────────┘  writer   └──────────────┘  reader   └──────────────┘
//!        │                                                   │
//!        └──────────────►┌──────────────┐◄───────────────────┘
//!          best effort   │ queue (mirror)│──► mirror writer ──► Mirror
//!                        └──────────────┘
//! ```
//!
//! Every loop is a tokio task in one [`JoinSet`]. A supervisor task joins the
//! set, cancels the shared token on the first fault, closes the transports
//! and reports the terminal event.
//!
//! # Example
//!
//! ```rust,ignore
//! use serial_snoop_bridge::{EndpointConfig, NoopObserver, SerialBridge, SerialTransportOpener};
//! use std::sync::Arc;
//!
//! let bridge = SerialBridge::new(Arc::new(SerialTransportOpener), Arc::new(NoopObserver));
//! bridge
//!     .start(EndpointConfig::new("COM3"), EndpointConfig::new("COM4"), None)
//!     .await?;
//! // ...
//! bridge.stop();
//! bridge.wait_stopped().await;
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{validate_endpoints, BridgeConfig, EndpointConfig};
use crate::diagnostics::{snapshot_of, DiagnosticsPublisher};
use crate::error::{BridgeError, Result};
use crate::frame::Direction;
use crate::observer::{BridgeObserver, ObserverHandle};
use crate::queue::frame_queue;
use crate::relay::{MirrorWriterLoop, ReaderLoop, WriterLoop};
use crate::stats::{BridgeStats, RelayCounters};
use crate::transport::{Transport, TransportOpener};

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Created, never started
    Idle,
    /// Relaying
    Running,
    /// Cancellation requested; loops are winding down
    Stopping,
    /// Session over; the engine cannot be started again
    Stopped,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Idle => write!(f, "Idle"),
            BridgeState::Running => write!(f, "Running"),
            BridgeState::Stopping => write!(f, "Stopping"),
            BridgeState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Open transports of one session
struct SessionTransports {
    upstream: Arc<dyn Transport>,
    downstream: Arc<dyn Transport>,
    mirror: Option<Arc<dyn Transport>>,
}

impl SessionTransports {
    fn all(&self) -> Vec<Arc<dyn Transport>> {
        let mut all = vec![self.upstream.clone(), self.downstream.clone()];
        all.extend(self.mirror.clone());
        all
    }
}

/// The bridge engine
///
/// One engine runs at most one session. Once that session has stopped the
/// engine stays [`BridgeState::Stopped`]; create a new engine to bridge again.
pub struct SerialBridge {
    opener: Arc<dyn TransportOpener>,
    observer: ObserverHandle,
    config: BridgeConfig,
    state: Arc<watch::Sender<BridgeState>>,
    counters: Arc<RelayCounters>,
    cancel: Mutex<Option<CancellationToken>>,
    diagnostics: Mutex<Option<DiagnosticsPublisher>>,
    /// Cancelled once the stop event has been delivered
    finished: CancellationToken,
    /// Held for the whole of a start; a concurrent start fails instead of waiting
    start_lock: tokio::sync::Mutex<()>,
}

impl SerialBridge {
    /// Create an idle engine with default tunables
    pub fn new(opener: Arc<dyn TransportOpener>, observer: Arc<dyn BridgeObserver>) -> Self {
        Self::with_config(opener, observer, BridgeConfig::default())
    }

    /// Create an idle engine with explicit tunables
    pub fn with_config(
        opener: Arc<dyn TransportOpener>,
        observer: Arc<dyn BridgeObserver>,
        config: BridgeConfig,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            opener,
            observer: ObserverHandle::new(observer),
            config,
            state: Arc::new(state),
            counters: Arc::new(RelayCounters::new()),
            cancel: Mutex::new(None),
            diagnostics: Mutex::new(None),
            finished: CancellationToken::new(),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Engine tunables
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// True while a session is relaying
    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    /// Current queue depths and counters
    ///
    /// Counters keep their final values after the session stops; queue
    /// depths read as zero once the queues are gone.
    pub fn stats(&self) -> BridgeStats {
        match self.diagnostics.lock().as_ref() {
            Some(publisher) => publisher.snapshot(),
            None => snapshot_of(&self.counters, 0, 0),
        }
    }

    /// Open the endpoints and start relaying
    ///
    /// Returns once every loop has been spawned and the engine is
    /// [`BridgeState::Running`]. Fails without side effects on a running or
    /// stopped engine, or while another start is still opening endpoints; an
    /// open failure closes whatever this call had already opened and leaves
    /// the engine idle.
    pub async fn start(
        &self,
        upstream: EndpointConfig,
        downstream: EndpointConfig,
        mirror: Option<EndpointConfig>,
    ) -> Result<()> {
        let Ok(_guard) = self.start_lock.try_lock() else {
            return Err(BridgeError::BridgeAlreadyRunning);
        };

        match self.state() {
            BridgeState::Idle => {}
            BridgeState::Running | BridgeState::Stopping => {
                return Err(BridgeError::BridgeAlreadyRunning)
            }
            BridgeState::Stopped => return Err(BridgeError::SessionEnded),
        }

        self.config.validate()?;
        validate_endpoints(&upstream, &downstream, mirror.as_ref())?;

        let mut opened = Vec::with_capacity(3);
        let transports = match self
            .open_endpoints(&upstream, &downstream, mirror.as_ref(), &mut opened)
            .await
        {
            Ok(transports) => transports,
            Err(e) => {
                error!(error = %e, "Failed to open bridge endpoints");
                close_transports(&opened).await;
                return Err(e);
            }
        };

        self.launch(transports);

        match &mirror {
            Some(mirror) => info!(
                upstream = %upstream.port_name,
                downstream = %downstream.port_name,
                mirror = %mirror.port_name,
                baud = upstream.baud_rate,
                "Bridge running with mirror"
            ),
            None => info!(
                upstream = %upstream.port_name,
                downstream = %downstream.port_name,
                baud = upstream.baud_rate,
                "Bridge running"
            ),
        }
        Ok(())
    }

    async fn open_endpoints(
        &self,
        upstream: &EndpointConfig,
        downstream: &EndpointConfig,
        mirror: Option<&EndpointConfig>,
        opened: &mut Vec<Arc<dyn Transport>>,
    ) -> Result<SessionTransports> {
        let upstream = self.open_endpoint(upstream, opened).await?;
        let downstream = self.open_endpoint(downstream, opened).await?;
        let mirror = match mirror {
            Some(config) => Some(self.open_endpoint(config, opened).await?),
            None => None,
        };
        Ok(SessionTransports {
            upstream,
            downstream,
            mirror,
        })
    }

    async fn open_endpoint(
        &self,
        config: &EndpointConfig,
        opened: &mut Vec<Arc<dyn Transport>>,
    ) -> Result<Arc<dyn Transport>> {
        let transport = self.opener.open(config).await?;
        debug!(port = %config.port_name, "Endpoint open");
        opened.push(transport.clone());
        Ok(transport)
    }

    /// Create the queues, spawn every loop and the supervisor
    fn launch(&self, transports: SessionTransports) {
        let cancel = CancellationToken::new();
        let capacity = self.config.queue_capacity;

        let (up_tx, up_rx) = frame_queue(capacity);
        let (down_tx, down_rx) = frame_queue(capacity);
        let (mirror_tx, mirror_rx) = match transports.mirror {
            Some(_) => {
                let (tx, rx) = frame_queue(capacity);
                (Some(tx), Some(rx))
            }
            None => (None, None),
        };

        let diagnostics = DiagnosticsPublisher::new(
            up_tx.gauge(),
            down_tx.gauge(),
            self.counters.clone(),
            self.observer.clone(),
        );

        *self.cancel.lock() = Some(cancel.clone());
        *self.diagnostics.lock() = Some(diagnostics.clone());
        self.state.send_replace(BridgeState::Running);

        let mut tasks = JoinSet::new();

        tasks.spawn(
            ReaderLoop {
                source: transports.upstream.clone(),
                direction: Direction::UpstreamToDownstream,
                forward: up_tx,
                mirror: mirror_tx.clone(),
                counters: self.counters.clone(),
                diagnostics: diagnostics.clone(),
                cancel: cancel.clone(),
                read_buffer_size: self.config.read_buffer_size,
                idle_backoff: self.config.idle_read_backoff,
            }
            .run(),
        );
        tasks.spawn(
            ReaderLoop {
                source: transports.downstream.clone(),
                direction: Direction::DownstreamToUpstream,
                forward: down_tx,
                mirror: mirror_tx,
                counters: self.counters.clone(),
                diagnostics,
                cancel: cancel.clone(),
                read_buffer_size: self.config.read_buffer_size,
                idle_backoff: self.config.idle_read_backoff,
            }
            .run(),
        );
        tasks.spawn(
            WriterLoop {
                dest: transports.downstream.clone(),
                direction: Direction::UpstreamToDownstream,
                queue: up_rx,
                observer: self.observer.clone(),
                cancel: cancel.clone(),
                write_timeout: self.config.write_timeout,
            }
            .run(),
        );
        tasks.spawn(
            WriterLoop {
                dest: transports.upstream.clone(),
                direction: Direction::DownstreamToUpstream,
                queue: down_rx,
                observer: self.observer.clone(),
                cancel: cancel.clone(),
                write_timeout: self.config.write_timeout,
            }
            .run(),
        );
        if let (Some(dest), Some(queue)) = (transports.mirror.clone(), mirror_rx) {
            tasks.spawn(
                MirrorWriterLoop {
                    dest,
                    queue,
                    cancel: cancel.clone(),
                    write_timeout: self.config.write_timeout,
                }
                .run(),
            );
        }

        debug!(tasks = tasks.len(), "Relay loops spawned");

        tokio::spawn(supervise(
            tasks,
            transports.all(),
            cancel,
            self.state.clone(),
            self.observer.clone(),
            self.finished.clone(),
        ));
    }

    /// Request the session to stop
    ///
    /// Returns immediately; completion is reported through
    /// [`BridgeObserver::on_stopped`] or [`SerialBridge::wait_stopped`].
    /// A no-op unless the engine is running.
    pub fn stop(&self) {
        let stopping = self.state.send_if_modified(|state| {
            if *state == BridgeState::Running {
                *state = BridgeState::Stopping;
                true
            } else {
                false
            }
        });

        if stopping {
            info!("Bridge stop requested");
            if let Some(cancel) = self.cancel.lock().as_ref() {
                cancel.cancel();
            }
        }
    }

    /// Wait until the session has ended and its stop event was delivered
    ///
    /// Returns immediately on an engine that was never started.
    pub async fn wait_stopped(&self) {
        if self.state() == BridgeState::Idle {
            return;
        }
        self.finished.cancelled().await;
    }
}

impl Drop for SerialBridge {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.get_mut().take() {
            cancel.cancel();
        }
    }
}

impl fmt::Debug for SerialBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialBridge")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Join every loop, then tear the session down
async fn supervise(
    mut tasks: JoinSet<Result<()>>,
    transports: Vec<Arc<dyn Transport>>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<BridgeState>>,
    observer: ObserverHandle,
    finished: CancellationToken,
) {
    let mut first_error: Option<BridgeError> = None;

    while let Some(joined) = tasks.join_next().await {
        let fault = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => {
                error!(error = %e, "Relay task failed");
                BridgeError::TaskFailed(e.to_string())
            }
        };

        if first_error.is_none() {
            warn!(code = fault.error_code(), error = %fault, "Session fault; stopping bridge");
            state.send_if_modified(|s| {
                if *s == BridgeState::Running {
                    *s = BridgeState::Stopping;
                    true
                } else {
                    false
                }
            });
            cancel.cancel();
            first_error = Some(fault);
        } else {
            debug!(error = %fault, "Additional fault during teardown");
        }
    }

    close_transports(&transports).await;
    state.send_replace(BridgeState::Stopped);

    match &first_error {
        Some(e) => info!(error = %e, "Bridge stopped with error"),
        None => info!("Bridge stopped"),
    }
    observer.stopped(first_error.as_ref());
    finished.cancel();
}

async fn close_transports(transports: &[Arc<dyn Transport>]) {
    for transport in transports {
        if let Err(e) = transport.close().await {
            warn!(port = %transport.name(), error = %e, "Failed to close transport");
        }
    }
}
