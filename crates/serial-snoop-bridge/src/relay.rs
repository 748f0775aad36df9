//! Reader and writer loops
//!
//! Each loop runs as its own task. Readers pull frames from a source
//! transport and push them onto queues without ever waiting; writers drain a
//! queue into a destination transport under a per-write deadline. Every
//! suspension point is raced against the session's cancellation token, and
//! cancellation always ends a loop with `Ok(())`.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::diagnostics::DiagnosticsPublisher;
use crate::error::{BridgeError, Result};
use crate::frame::{Direction, Frame};
use crate::observer::ObserverHandle;
use crate::queue::{FrameReceiver, FrameSender, TryPushError};
use crate::stats::RelayCounters;
use crate::transport::Transport;

/// Warn on the first drop and then once per this many drops
const DROP_WARN_EVERY: u64 = 1000;

/// Pulls frames from one source transport
pub(crate) struct ReaderLoop {
    pub(crate) source: Arc<dyn Transport>,
    pub(crate) direction: Direction,
    pub(crate) forward: FrameSender,
    pub(crate) mirror: Option<FrameSender>,
    pub(crate) counters: Arc<RelayCounters>,
    pub(crate) diagnostics: DiagnosticsPublisher,
    pub(crate) cancel: CancellationToken,
    pub(crate) read_buffer_size: usize,
    pub(crate) idle_backoff: Duration,
}

impl ReaderLoop {
    pub(crate) async fn run(self) -> Result<()> {
        let port = self.source.name().to_string();
        debug!(port = %port, direction = %self.direction, "Reader loop started");

        let mut buf = vec![0u8; self.read_buffer_size];
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = self.source.read(&mut buf) => read,
            };

            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    error!(port = %port, direction = %self.direction, error = %e, "Read fault; ending session");
                    return Err(e);
                }
            };

            if n == 0 {
                // No data yet; back off instead of spinning on an idle port
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_backoff) => continue,
                }
            }

            let frame = Frame::copy_from_slice(&buf[..n]);
            trace!(port = %port, direction = %self.direction, bytes = n, "Frame read");

            match self.forward.try_push(frame.clone()) {
                Ok(()) => self.counters.record_relayed(self.direction, n),
                Err(TryPushError::Full(_)) => {
                    self.counters.record_dropped(self.direction);
                    let dropped = self.counters.dropped(self.direction);
                    if dropped == 1 || dropped % DROP_WARN_EVERY == 0 {
                        warn!(direction = %self.direction, dropped, "Forward queue full; dropping frames");
                    } else {
                        trace!(direction = %self.direction, dropped, "Forward queue full; frame dropped");
                    }
                }
                Err(TryPushError::Closed(_)) => {
                    trace!(direction = %self.direction, "Forward queue closed; frame discarded");
                }
            }

            if let Some(mirror) = &self.mirror {
                // Mirroring is best effort and not counted
                let _ = mirror.try_push(frame);
            }

            self.diagnostics.publish();
        }

        debug!(port = %port, direction = %self.direction, "Reader loop cancelled");
        Ok(())
    }
}

/// Outcome of one deadline-bounded write
enum WriteOutcome {
    Written,
    Cancelled,
    TimedOut,
    Failed(BridgeError),
}

/// Write a frame then flush, both under one deadline; flush errors are ignored
async fn timed_write(
    dest: &dyn Transport,
    frame: &Frame,
    deadline: Duration,
    cancel: &CancellationToken,
) -> WriteOutcome {
    let write = async {
        dest.write(frame.as_bytes()).await?;
        if let Err(e) = dest.flush().await {
            trace!(port = %dest.name(), error = %e, "Flush failed; ignored");
        }
        Ok::<(), BridgeError>(())
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => WriteOutcome::Cancelled,
        result = tokio::time::timeout(deadline, write) => match result {
            Ok(Ok(())) => WriteOutcome::Written,
            Ok(Err(e)) => WriteOutcome::Failed(e),
            Err(_) => WriteOutcome::TimedOut,
        },
    }
}

/// Wait for the next frame, or `None` on cancellation or a closed queue
async fn next_frame(queue: &mut FrameReceiver, cancel: &CancellationToken) -> Option<Frame> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        frame = queue.pop() => frame,
    }
}

/// Drains one primary queue into its destination
///
/// Any write fault or deadline expiry ends the loop with an error, which the
/// engine turns into the session's terminal error.
pub(crate) struct WriterLoop {
    pub(crate) dest: Arc<dyn Transport>,
    pub(crate) direction: Direction,
    pub(crate) queue: FrameReceiver,
    pub(crate) observer: ObserverHandle,
    pub(crate) cancel: CancellationToken,
    pub(crate) write_timeout: Duration,
}

impl WriterLoop {
    pub(crate) async fn run(mut self) -> Result<()> {
        let port = self.dest.name().to_string();
        debug!(port = %port, direction = %self.direction, "Writer loop started");

        let result = loop {
            let Some(frame) = next_frame(&mut self.queue, &self.cancel).await else {
                break Ok(());
            };

            match timed_write(&*self.dest, &frame, self.write_timeout, &self.cancel).await {
                WriteOutcome::Written => {
                    trace!(port = %port, direction = %self.direction, bytes = frame.len(), "Frame written");
                    self.observer.data_relayed(self.direction, &frame);
                }
                WriteOutcome::Cancelled => break Ok(()),
                WriteOutcome::TimedOut => {
                    error!(port = %port, direction = %self.direction, "Write timed out; ending session");
                    break Err(BridgeError::WriteTimeout {
                        port: port.clone(),
                        timeout_ms: self.write_timeout.as_millis() as u64,
                    });
                }
                WriteOutcome::Failed(e) => {
                    error!(port = %port, direction = %self.direction, error = %e, "Write fault; ending session");
                    break Err(e);
                }
            }
        };

        self.queue.close();
        debug!(port = %port, direction = %self.direction, "Writer loop ended");
        result
    }
}

/// Drains the mirror queue into the mirror transport
///
/// Never fails: write faults skip the frame, and a deadline expiry quietly
/// ends mirroring for the rest of the session.
pub(crate) struct MirrorWriterLoop {
    pub(crate) dest: Arc<dyn Transport>,
    pub(crate) queue: FrameReceiver,
    pub(crate) cancel: CancellationToken,
    pub(crate) write_timeout: Duration,
}

impl MirrorWriterLoop {
    pub(crate) async fn run(mut self) -> Result<()> {
        let port = self.dest.name().to_string();
        debug!(port = %port, "Mirror writer loop started");

        while let Some(frame) = next_frame(&mut self.queue, &self.cancel).await {
            match timed_write(&*self.dest, &frame, self.write_timeout, &self.cancel).await {
                WriteOutcome::Written => {
                    trace!(port = %port, bytes = frame.len(), "Frame mirrored");
                }
                WriteOutcome::Cancelled => break,
                WriteOutcome::TimedOut => {
                    warn!(port = %port, "Mirror write timed out; mirroring stopped");
                    break;
                }
                WriteOutcome::Failed(e) => {
                    warn!(port = %port, error = %e, "Mirror write failed; frame skipped");
                }
            }
        }

        self.queue.close();
        debug!(port = %port, "Mirror writer loop ended");
        Ok(())
    }
}
