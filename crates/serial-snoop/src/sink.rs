//! Session output, off the relay path
//!
//! The engine only feeds an [`EventForwarder`](serial_snoop_bridge::EventForwarder)
//! channel. [`SessionSink::drain`] empties that channel on a blocking thread
//! and does every console, relay-log, history and diagnostics write there,
//! flushing the console once per batch. A slow terminal or disk only makes
//! the channel longer; it never holds up a writer loop.

use serial_snoop_bridge::{
    BridgeEvent, BridgeObserver, DiagnosticsLogger, LogEntry, LogHistory, RelayFileLogger,
    StopFault,
};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Most events handled between two console flushes
pub const BATCH_SIZE: usize = 200;

/// Everything a session writes its events to
#[derive(Default)]
pub struct SessionSink {
    console: Option<Box<dyn Write + Send>>,
    relay_log: Option<RelayFileLogger>,
    history: Option<Arc<LogHistory>>,
    diagnostics: Option<DiagnosticsLogger>,
}

impl SessionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print one relay-log line per relayed frame to `out`
    pub fn with_console(mut self, out: Box<dyn Write + Send>) -> Self {
        self.console = Some(out);
        self
    }

    pub fn with_relay_log(mut self, logger: RelayFileLogger) -> Self {
        self.relay_log = Some(logger);
        self
    }

    pub fn with_history(mut self, history: Arc<LogHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_diagnostics(mut self, logger: DiagnosticsLogger) -> Self {
        self.diagnostics = Some(logger);
        self
    }

    /// Handle events until the stop event, returning its fault
    ///
    /// Blocks the calling thread; run it under `spawn_blocking`.
    pub fn drain(mut self, mut events: UnboundedReceiver<BridgeEvent>) -> Option<StopFault> {
        while let Some(first) = events.blocking_recv() {
            let mut next = Some(first);
            let mut handled = 0;
            while let Some(event) = next.take() {
                if let BridgeEvent::Stopped(fault) = event {
                    self.flush_console();
                    if let (Some(logger), Some(fault)) = (&self.diagnostics, &fault) {
                        logger.log_stop_fault(&fault.message);
                    }
                    return fault;
                }
                self.handle(event);
                handled += 1;
                if handled < BATCH_SIZE {
                    next = events.try_recv().ok();
                }
            }
            self.flush_console();
        }

        debug!("Event channel closed before the stop event");
        None
    }

    fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::DataRelayed { direction, frame } => {
                let entry = LogEntry::now(direction, &frame);
                if let Some(out) = &mut self.console {
                    // A closed stdout must not end the session
                    let _ = out.write_all(format!("{}\n", entry).as_bytes());
                }
                if let Some(logger) = &self.relay_log {
                    logger.record(&entry);
                }
                if let Some(history) = &self.history {
                    history.record(entry);
                }
            }
            BridgeEvent::Diagnostics(stats) => {
                if let Some(logger) = &self.diagnostics {
                    logger.on_diagnostics(&stats);
                }
            }
            BridgeEvent::Stopped(_) => {}
        }
    }

    fn flush_console(&mut self) {
        if let Some(out) = &mut self.console {
            let _ = out.flush();
        }
    }
}
