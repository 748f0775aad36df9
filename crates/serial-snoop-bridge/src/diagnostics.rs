//! Diagnostics publisher
//!
//! Reads the primary queue depths and the relay counters into a
//! [`BridgeStats`] snapshot. Every read is O(1), so reader loops call
//! [`DiagnosticsPublisher::publish`] on every iteration.

use std::sync::Arc;

use crate::frame::Direction;
use crate::observer::ObserverHandle;
use crate::queue::QueueGauge;
use crate::stats::{BridgeStats, RelayCounters};

/// Snapshot source shared by the reader loops and the engine
#[derive(Clone)]
pub(crate) struct DiagnosticsPublisher {
    upstream_queue: QueueGauge,
    downstream_queue: QueueGauge,
    counters: Arc<RelayCounters>,
    observer: ObserverHandle,
}

impl DiagnosticsPublisher {
    pub(crate) fn new(
        upstream_queue: QueueGauge,
        downstream_queue: QueueGauge,
        counters: Arc<RelayCounters>,
        observer: ObserverHandle,
    ) -> Self {
        Self {
            upstream_queue,
            downstream_queue,
            counters,
            observer,
        }
    }

    /// Current queue depths and counters
    pub(crate) fn snapshot(&self) -> BridgeStats {
        snapshot_of(
            &self.counters,
            self.upstream_queue.depth(),
            self.downstream_queue.depth(),
        )
    }

    /// Emit a snapshot to the observer; never fails
    pub(crate) fn publish(&self) {
        let stats = self.snapshot();
        self.observer.diagnostics(&stats);
    }
}

/// Build a snapshot from counters and explicit queue depths
pub(crate) fn snapshot_of(
    counters: &RelayCounters,
    up_pending: usize,
    down_pending: usize,
) -> BridgeStats {
    BridgeStats {
        up_pending,
        down_pending,
        up_dropped: counters.dropped(Direction::UpstreamToDownstream),
        down_dropped: counters.dropped(Direction::DownstreamToUpstream),
        bytes_up: counters.bytes(Direction::UpstreamToDownstream),
        bytes_down: counters.bytes(Direction::DownstreamToUpstream),
    }
}
