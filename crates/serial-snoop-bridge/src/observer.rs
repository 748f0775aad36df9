//! Engine → consumer event surface
//!
//! The engine holds a single [`BridgeObserver`] and reports three kinds of
//! events through it: relayed frames, diagnostics snapshots and the terminal
//! stop. Loggers, consoles and UIs are all just observers; several of them
//! can be attached at once with [`ObserverGroup`], and [`EventForwarder`]
//! turns the callbacks into a channel of [`BridgeEvent`]s for async consumers.
//!
//! Callbacks run on the engine's relay tasks and must return quickly.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::BridgeError;
use crate::frame::{Direction, Frame};
use crate::stats::BridgeStats;

/// Receiver of bridge events
///
/// Every method has an empty default so observers implement only what they
/// care about.
pub trait BridgeObserver: Send + Sync {
    /// A frame was written to its destination
    fn on_data_relayed(&self, _direction: Direction, _frame: &Frame) {}

    /// Fresh diagnostics snapshot, published after every read
    fn on_diagnostics(&self, _stats: &BridgeStats) {}

    /// The session ended; `error` is the fault that ended it, if any
    fn on_stopped(&self, _error: Option<&BridgeError>) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BridgeObserver for NoopObserver {}

/// Fan-out to several observers, in registration order
#[derive(Default, Clone)]
pub struct ObserverGroup {
    observers: Vec<Arc<dyn BridgeObserver>>,
}

impl ObserverGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    pub fn with(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add an observer in place
    pub fn push(&mut self, observer: Arc<dyn BridgeObserver>) {
        self.observers.push(observer);
    }

    /// Number of attached observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// True when no observer is attached
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl BridgeObserver for ObserverGroup {
    fn on_data_relayed(&self, direction: Direction, frame: &Frame) {
        for observer in &self.observers {
            guarded("data_relayed", || observer.on_data_relayed(direction, frame));
        }
    }

    fn on_diagnostics(&self, stats: &BridgeStats) {
        for observer in &self.observers {
            guarded("diagnostics", || observer.on_diagnostics(stats));
        }
    }

    fn on_stopped(&self, error: Option<&BridgeError>) {
        for observer in &self.observers {
            guarded("stopped", || observer.on_stopped(error));
        }
    }
}

/// Summary of the fault carried by a stop event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopFault {
    /// Stable error code, see [`BridgeError::error_code`]
    pub code: &'static str,
    /// Rendered error message
    pub message: String,
}

impl From<&BridgeError> for StopFault {
    fn from(err: &BridgeError) -> Self {
        Self {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

/// Owned form of an observer callback
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// See [`BridgeObserver::on_data_relayed`]
    DataRelayed {
        /// Flow the frame travelled
        direction: Direction,
        /// Frame as written
        frame: Frame,
    },
    /// See [`BridgeObserver::on_diagnostics`]
    Diagnostics(BridgeStats),
    /// See [`BridgeObserver::on_stopped`]
    Stopped(Option<StopFault>),
}

/// Observer that forwards events into an unbounded channel
///
/// Diagnostics are published once per read and are skipped unless enabled
/// with [`EventForwarder::with_diagnostics`].
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<BridgeEvent>,
    diagnostics: bool,
}

impl EventForwarder {
    /// Create a forwarder and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                diagnostics: false,
            },
            rx,
        )
    }

    /// Also forward diagnostics snapshots
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }
}

impl BridgeObserver for EventForwarder {
    fn on_data_relayed(&self, direction: Direction, frame: &Frame) {
        let _ = self.tx.send(BridgeEvent::DataRelayed {
            direction,
            frame: frame.clone(),
        });
    }

    fn on_diagnostics(&self, stats: &BridgeStats) {
        if self.diagnostics {
            let _ = self.tx.send(BridgeEvent::Diagnostics(*stats));
        }
    }

    fn on_stopped(&self, error: Option<&BridgeError>) {
        let _ = self.tx.send(BridgeEvent::Stopped(error.map(StopFault::from)));
    }
}

/// Run an observer callback, containing any panic it raises
pub(crate) fn guarded<F: FnOnce()>(event: &'static str, f: F) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(event, panic = %panic_message(&*panic), "Observer panicked; event discarded");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Engine-side wrapper that never lets an observer panic escape
#[derive(Clone)]
pub(crate) struct ObserverHandle {
    inner: Arc<dyn BridgeObserver>,
}

impl ObserverHandle {
    pub(crate) fn new(inner: Arc<dyn BridgeObserver>) -> Self {
        Self { inner }
    }

    pub(crate) fn data_relayed(&self, direction: Direction, frame: &Frame) {
        guarded("data_relayed", || self.inner.on_data_relayed(direction, frame));
    }

    pub(crate) fn diagnostics(&self, stats: &BridgeStats) {
        guarded("diagnostics", || self.inner.on_diagnostics(stats));
    }

    pub(crate) fn stopped(&self, error: Option<&BridgeError>) {
        guarded("stopped", || self.inner.on_stopped(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        relayed: Mutex<Vec<(Direction, Vec<u8>)>>,
        stops: Mutex<u32>,
    }

    impl BridgeObserver for Recorder {
        fn on_data_relayed(&self, direction: Direction, frame: &Frame) {
            self.relayed.lock().push((direction, frame.to_vec()));
        }

        fn on_stopped(&self, _error: Option<&BridgeError>) {
            *self.stops.lock() += 1;
        }
    }

    struct Panicker;

    impl BridgeObserver for Panicker {
        fn on_diagnostics(&self, _stats: &BridgeStats) {
            panic!("boom");
        }

        fn on_data_relayed(&self, _direction: Direction, _frame: &Frame) {
            panic!("boom");
        }
    }

    #[test]
    fn test_group_fans_out_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let group = ObserverGroup::new()
            .with(first.clone())
            .with(second.clone());
        assert_eq!(group.len(), 2);

        let frame = Frame::copy_from_slice(b"hi");
        group.on_data_relayed(Direction::UpstreamToDownstream, &frame);
        group.on_stopped(None);

        assert_eq!(first.relayed.lock().len(), 1);
        assert_eq!(second.relayed.lock()[0].1, b"hi".to_vec());
        assert_eq!(*second.stops.lock(), 1);
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        let recorder = Arc::new(Recorder::default());
        let group = ObserverGroup::new()
            .with(Arc::new(Panicker))
            .with(recorder.clone());

        let handle = ObserverHandle::new(Arc::new(group));
        handle.diagnostics(&BridgeStats::default());
        handle.data_relayed(
            Direction::DownstreamToUpstream,
            &Frame::copy_from_slice(b"x"),
        );

        // The panicking observer must not starve the ones after it
        assert_eq!(recorder.relayed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_event_forwarder() {
        let (forwarder, mut rx) = EventForwarder::channel();
        forwarder.on_diagnostics(&BridgeStats::default());
        forwarder.on_data_relayed(
            Direction::UpstreamToDownstream,
            &Frame::copy_from_slice(b"abc"),
        );
        forwarder.on_stopped(Some(&BridgeError::SessionEnded));

        match rx.recv().await.unwrap() {
            BridgeEvent::DataRelayed { direction, frame } => {
                assert_eq!(direction, Direction::UpstreamToDownstream);
                assert_eq!(frame.as_bytes(), b"abc");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            BridgeEvent::Stopped(Some(fault)) => assert_eq!(fault.code, "SESSION_ENDED"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
