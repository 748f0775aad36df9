//! Relay counters and diagnostics snapshots
//!
//! Counters are plain atomics updated from every reader loop. They only ever
//! grow during a session; a new bridge instance starts from zero.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::Direction;

/// Monotonic byte and drop counters, per direction
#[derive(Debug, Default)]
pub struct RelayCounters {
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
    dropped_up: AtomicU64,
    dropped_down: AtomicU64,
}

impl RelayCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame accepted by its forward queue
    pub fn record_relayed(&self, direction: Direction, len: usize) {
        self.bytes_counter(direction)
            .fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record a frame discarded because its forward queue was full
    pub fn record_dropped(&self, direction: Direction) {
        self.drop_counter(direction).fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes accepted for a direction so far
    pub fn bytes(&self, direction: Direction) -> u64 {
        self.bytes_counter(direction).load(Ordering::Relaxed)
    }

    /// Frames dropped for a direction so far
    pub fn dropped(&self, direction: Direction) -> u64 {
        self.drop_counter(direction).load(Ordering::Relaxed)
    }

    fn bytes_counter(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::UpstreamToDownstream => &self.bytes_up,
            Direction::DownstreamToUpstream => &self.bytes_down,
        }
    }

    fn drop_counter(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::UpstreamToDownstream => &self.dropped_up,
            Direction::DownstreamToUpstream => &self.dropped_down,
        }
    }
}

/// Point-in-time view of queue depths and counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Frames waiting in the upstream→downstream queue
    pub up_pending: usize,
    /// Frames waiting in the downstream→upstream queue
    pub down_pending: usize,
    /// Frames dropped upstream→downstream
    pub up_dropped: u64,
    /// Frames dropped downstream→upstream
    pub down_dropped: u64,
    /// Bytes accepted upstream→downstream
    pub bytes_up: u64,
    /// Bytes accepted downstream→upstream
    pub bytes_down: u64,
}

impl BridgeStats {
    /// Total frames dropped in both directions
    pub fn total_dropped(&self) -> u64 {
        self.up_dropped + self.down_dropped
    }

    /// Total bytes accepted in both directions
    pub fn total_bytes(&self) -> u64 {
        self.bytes_up + self.bytes_down
    }
}

impl fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UpPending={} DownPending={} UpDropped={} DownDropped={} BytesUp={} BytesDown={}",
            self.up_pending,
            self.down_pending,
            self.up_dropped,
            self.down_dropped,
            self.bytes_up,
            self.bytes_down
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_direction() {
        let counters = RelayCounters::new();
        counters.record_relayed(Direction::UpstreamToDownstream, 10);
        counters.record_relayed(Direction::UpstreamToDownstream, 5);
        counters.record_dropped(Direction::DownstreamToUpstream);

        assert_eq!(counters.bytes(Direction::UpstreamToDownstream), 15);
        assert_eq!(counters.bytes(Direction::DownstreamToUpstream), 0);
        assert_eq!(counters.dropped(Direction::UpstreamToDownstream), 0);
        assert_eq!(counters.dropped(Direction::DownstreamToUpstream), 1);
    }

    #[test]
    fn test_stats_display_line() {
        let stats = BridgeStats {
            up_pending: 1,
            down_pending: 2,
            up_dropped: 3,
            down_dropped: 4,
            bytes_up: 5,
            bytes_down: 6,
        };
        assert_eq!(
            stats.to_string(),
            "UpPending=1 DownPending=2 UpDropped=3 DownDropped=4 BytesUp=5 BytesDown=6"
        );
        assert_eq!(stats.total_dropped(), 7);
        assert_eq!(stats.total_bytes(), 11);
    }
}
