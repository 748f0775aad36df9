//! Integration tests for the serial bridge engine
//!
//! These tests drive a full session over in-memory transports:
//! - Per-direction FIFO relaying and relayed-data events
//! - Write deadlines and fault propagation
//! - Drop-on-full accounting under overload
//! - Mirror isolation (stalls and faults never end the session)
//! - Lifecycle misuse and open failures

use serial_snoop_bridge::test_utils::{ReadStep, WriteBehavior};
use serial_snoop_bridge::{
    BridgeConfig, BridgeError, BridgeEvent, BridgeState, Direction, EndpointConfig,
    EventForwarder, LogHistory, MockTransportOpener, ObserverGroup, SerialBridge, StopFault,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// Helpers
// ============================================================================

const UP: &str = "UP";
const DOWN: &str = "DOWN";
const MIRROR: &str = "MIRROR";

/// Generous bound for waits in real-time tests
const WAIT: Duration = Duration::from_secs(5);

fn bridge_with(
    opener: &Arc<MockTransportOpener>,
    config: BridgeConfig,
    diagnostics: bool,
) -> (SerialBridge, UnboundedReceiver<BridgeEvent>) {
    let (forwarder, events) = EventForwarder::channel();
    let bridge = SerialBridge::with_config(
        opener.clone(),
        Arc::new(forwarder.with_diagnostics(diagnostics)),
        config,
    );
    (bridge, events)
}

async fn start(bridge: &SerialBridge, mirror: bool) {
    bridge
        .start(
            EndpointConfig::new(UP),
            EndpointConfig::new(DOWN),
            mirror.then(|| EndpointConfig::new(MIRROR)),
        )
        .await
        .expect("bridge should start");
}

/// Collect events up to and including the stop event
async fn until_stopped(
    events: &mut UnboundedReceiver<BridgeEvent>,
) -> (Vec<BridgeEvent>, Option<StopFault>) {
    let mut seen = Vec::new();
    loop {
        match events.recv().await.expect("event channel open") {
            BridgeEvent::Stopped(fault) => return (seen, fault),
            other => seen.push(other),
        }
    }
}

fn relayed(events: &[BridgeEvent]) -> Vec<(Direction, Vec<u8>)> {
    events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::DataRelayed { direction, frame } => Some((*direction, frame.to_vec())),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Relaying
// ============================================================================

#[tokio::test]
async fn test_frames_relayed_in_fifo_order_both_directions() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let (bridge, mut events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, false).await;

    for chunk in [&b"one"[..], b"two", b"three", b"four"] {
        up.push_read(chunk);
    }
    down.push_read(b"reply");

    tokio::time::timeout(WAIT, down.wait_for_writes(4)).await.unwrap();
    tokio::time::timeout(WAIT, up.wait_for_writes(1)).await.unwrap();

    assert_eq!(
        down.written(),
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec(), b"four".to_vec()]
    );
    assert_eq!(up.written(), vec![b"reply".to_vec()]);

    bridge.stop();
    let (seen, fault) = tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();
    assert!(fault.is_none());

    let tx: Vec<_> = relayed(&seen)
        .into_iter()
        .filter(|(d, _)| *d == Direction::UpstreamToDownstream)
        .map(|(_, data)| data)
        .collect();
    assert_eq!(tx.len(), 4);
    assert_eq!(tx[2], b"three".to_vec());
    assert!(relayed(&seen).contains(&(Direction::DownstreamToUpstream, b"reply".to_vec())));

    let stats = bridge.stats();
    assert_eq!(stats.bytes_up, 3 + 3 + 5 + 4);
    assert_eq!(stats.bytes_down, 5);
    assert_eq!(stats.total_dropped(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_reads_are_not_frames() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let (bridge, mut events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, false).await;

    for _ in 0..5 {
        up.push_step(ReadStep::Empty);
    }
    up.push_read(b"data");
    down.wait_for_writes(1).await;

    bridge.stop();
    let (seen, fault) = until_stopped(&mut events).await;
    assert!(fault.is_none());
    assert_eq!(relayed(&seen), vec![(Direction::UpstreamToDownstream, b"data".to_vec())]);
    assert_eq!(up.pending_reads(), 0);
}

#[tokio::test]
async fn test_frames_larger_than_read_buffer_are_split() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let (bridge, _events) = bridge_with(
        &opener,
        BridgeConfig::default().with_read_buffer_size(4),
        false,
    );
    start(&bridge, false).await;

    up.push_read(b"abcdefghij");
    tokio::time::timeout(WAIT, down.wait_for_writes(3)).await.unwrap();
    assert_eq!(
        down.written(),
        vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]
    );

    bridge.stop();
    bridge.wait_stopped().await;
}

// ============================================================================
// Faults and Deadlines
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stalled_write_times_out_exactly_once() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    down.set_write_behavior(WriteBehavior::Stall);

    let config = BridgeConfig::default().with_write_timeout(Duration::from_millis(250));
    let (bridge, mut events) = bridge_with(&opener, config, false);
    start(&bridge, false).await;

    up.push_read(b"first");
    up.push_read(b"second");

    let (seen, fault) = until_stopped(&mut events).await;
    let fault = fault.expect("session should end with an error");
    assert_eq!(fault.code, "WRITE_TIMEOUT");
    assert!(fault.message.contains(DOWN));
    assert!(relayed(&seen).is_empty());

    bridge.wait_stopped().await;
    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert_eq!(down.write_count(), 0);
    assert!(up.is_closed());
    assert!(down.is_closed());

    // Exactly one stop event
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_primary_write_fault_ends_session() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    opener.register(DOWN).set_write_behavior(WriteBehavior::Fail);
    let (bridge, mut events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, false).await;

    up.push_read(b"x");
    let (_, fault) = tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();
    assert_eq!(fault.unwrap().code, "WRITE_ERROR");
}

#[tokio::test]
async fn test_read_fault_ends_session() {
    let opener = Arc::new(MockTransportOpener::new());
    let down = opener.register(DOWN);
    opener.register(UP);
    let (bridge, mut events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, false).await;

    down.push_step(ReadStep::Error("cable unplugged".into()));
    let (_, fault) = tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();
    let fault = fault.unwrap();
    assert_eq!(fault.code, "READ_ERROR");
    assert!(fault.message.contains("cable unplugged"));

    bridge.wait_stopped().await;
    assert!(opener.transport(UP).unwrap().is_closed());
    assert!(down.is_closed());
}

// ============================================================================
// Overload
// ============================================================================

#[tokio::test]
async fn test_full_queue_drops_and_counts() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    down.set_write_behavior(WriteBehavior::Stall);

    let config = BridgeConfig::default()
        .with_queue_capacity(2)
        .with_write_timeout(Duration::from_secs(3600));
    let (bridge, mut events) = bridge_with(&opener, config, true);
    start(&bridge, false).await;

    const FRAMES: u64 = 6;
    for b in 0..FRAMES as u8 {
        up.push_read(vec![b]);
    }

    // Every frame is either accepted (1 byte each) or dropped
    let stats = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(BridgeEvent::Diagnostics(stats)) = events.recv().await {
                if stats.bytes_up + stats.up_dropped == FRAMES {
                    return stats;
                }
            }
        }
    })
    .await
    .unwrap();

    // At most one frame in the stalled writer plus two queued
    assert!(stats.up_dropped >= FRAMES - 3, "dropped {}", stats.up_dropped);
    assert!(stats.up_pending <= 2);
    assert_eq!(stats.down_dropped, 0);
    assert_eq!(down.write_count(), 0);

    // Dropping is not a fault
    bridge.stop();
    let (_, fault) = tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();
    assert!(fault.is_none());
    assert_eq!(bridge.stats().up_dropped, stats.up_dropped);
}

// ============================================================================
// Mirror
// ============================================================================

#[tokio::test]
async fn test_mirror_receives_both_directions() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let mirror = opener.register(MIRROR);
    let (bridge, mut events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, true).await;

    up.push_read(b"ping");
    tokio::time::timeout(WAIT, down.wait_for_writes(1)).await.unwrap();
    down.push_read(b"pong");
    tokio::time::timeout(WAIT, up.wait_for_writes(1)).await.unwrap();
    tokio::time::timeout(WAIT, mirror.wait_for_writes(2)).await.unwrap();

    assert_eq!(mirror.written(), vec![b"ping".to_vec(), b"pong".to_vec()]);
    assert_eq!(mirror.pending_reads(), 0);

    bridge.stop();
    let (seen, fault) = tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();
    assert!(fault.is_none());
    // Mirror writes are not reported as relayed data
    assert_eq!(relayed(&seen).len(), 2);
    assert!(mirror.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_mirror_stall_does_not_fault_session() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    opener.register(MIRROR).set_write_behavior(WriteBehavior::Stall);

    let config = BridgeConfig::default().with_write_timeout(Duration::from_millis(100));
    let (bridge, mut events) = bridge_with(&opener, config, false);
    start(&bridge, true).await;

    up.push_read(b"a");
    down.wait_for_writes(1).await;

    // Well past the mirror's deadline
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(bridge.is_running());

    up.push_read(b"b");
    down.wait_for_writes(2).await;
    assert_eq!(down.written(), vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(bridge.stats().total_dropped(), 0);

    bridge.stop();
    let (_, fault) = until_stopped(&mut events).await;
    assert!(fault.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_mirror_overflow_leaves_primary_paths_whole() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let mirror = opener.register(MIRROR);
    // Slow but always inside the deadline
    mirror.set_write_behavior(WriteBehavior::Delay(Duration::from_millis(50)));

    let config = BridgeConfig::default()
        .with_queue_capacity(2)
        .with_write_timeout(Duration::from_millis(100));
    let (bridge, mut events) = bridge_with(&opener, config, false);
    start(&bridge, true).await;

    const FRAMES: usize = 20;
    for b in 0..FRAMES {
        up.push_read(vec![b as u8]);
        down.wait_for_writes(b + 1).await;
    }
    down.push_read(b"back");
    up.wait_for_writes(1).await;

    let expected: Vec<Vec<u8>> = (0..FRAMES).map(|b| vec![b as u8]).collect();
    assert_eq!(down.written(), expected);
    assert_eq!(up.written(), vec![b"back".to_vec()]);
    let stats = bridge.stats();
    assert_eq!(stats.total_dropped(), 0);
    assert_eq!(stats.bytes_up, FRAMES as u64);

    // The mirror fell behind and shed frames without ending the session
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(mirror.write_count() < FRAMES);
    assert!(bridge.is_running());

    // Still mirroring once it catches up
    up.push_read(b"late");
    down.wait_for_writes(FRAMES + 1).await;
    while !mirror.written().contains(&b"late".to_vec()) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    bridge.stop();
    let (seen, fault) = until_stopped(&mut events).await;
    assert!(fault.is_none());
    assert_eq!(relayed(&seen).len(), FRAMES + 2);
}

#[tokio::test]
async fn test_mirror_write_fault_does_not_fault_session() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let mirror = opener.register(MIRROR);
    mirror.set_write_behavior(WriteBehavior::Fail);
    let (bridge, mut events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, true).await;

    for chunk in [&b"1"[..], b"2", b"3"] {
        up.push_read(chunk);
    }
    tokio::time::timeout(WAIT, down.wait_for_writes(3)).await.unwrap();
    assert!(bridge.is_running());

    // The mirror recovers and keeps receiving later frames
    mirror.set_write_behavior(WriteBehavior::Normal);
    up.push_read(b"4");
    tokio::time::timeout(WAIT, async {
        while !mirror.written().contains(&b"4".to_vec()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::timeout(WAIT, down.wait_for_writes(4)).await.unwrap();

    bridge.stop();
    let (_, fault) = tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();
    assert!(fault.is_none());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_second_start_rejected_without_disturbing_session() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);
    let (bridge, _events) = bridge_with(&opener, BridgeConfig::default(), false);
    start(&bridge, false).await;

    let err = bridge
        .start(EndpointConfig::new("OTHER1"), EndpointConfig::new("OTHER2"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::BridgeAlreadyRunning));
    assert_eq!(opener.open_count(), 2);

    up.push_read(b"still relaying");
    tokio::time::timeout(WAIT, down.wait_for_writes(1)).await.unwrap();

    bridge.stop();
    bridge.stop();
    tokio::time::timeout(WAIT, bridge.wait_stopped()).await.unwrap();

    let err = bridge
        .start(EndpointConfig::new(UP), EndpointConfig::new(DOWN), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SessionEnded));
    assert_eq!(bridge.state(), BridgeState::Stopped);

    // Stop after the session ended is a no-op
    bridge.stop();
    assert_eq!(bridge.state(), BridgeState::Stopped);
}

#[tokio::test]
async fn test_open_failure_closes_opened_transports() {
    let opener = Arc::new(MockTransportOpener::new());
    opener.fail_open(DOWN);
    let (bridge, _events) = bridge_with(&opener, BridgeConfig::default(), false);

    let err = bridge
        .start(EndpointConfig::new(UP), EndpointConfig::new(DOWN), None)
        .await
        .unwrap_err();
    assert!(err.is_open_failure());
    assert!(opener.transport(UP).unwrap().is_closed());
    assert_eq!(bridge.state(), BridgeState::Idle);
}

#[tokio::test]
async fn test_mirror_open_failure_is_fatal_to_start() {
    let opener = Arc::new(MockTransportOpener::new());
    opener.fail_open(MIRROR);
    let (bridge, _events) = bridge_with(&opener, BridgeConfig::default(), false);

    let err = bridge
        .start(
            EndpointConfig::new(UP),
            EndpointConfig::new(DOWN),
            Some(EndpointConfig::new(MIRROR)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PORT_OPEN_FAILED");
    assert!(opener.transport(UP).unwrap().is_closed());
    assert!(opener.transport(DOWN).unwrap().is_closed());
    assert!(!bridge.is_running());
}

#[tokio::test]
async fn test_endpoint_settings_reach_opener() {
    let opener = Arc::new(MockTransportOpener::new());
    let (bridge, _events) = bridge_with(&opener, BridgeConfig::default(), false);

    let upstream = EndpointConfig::new(UP).with_baud_rate(115_200).with_lines(true, false);
    let downstream = upstream.for_port(DOWN);
    bridge.start(upstream, downstream, None).await.unwrap();

    let opened = opener.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].port_name, DOWN);
    assert_eq!(opened[1].baud_rate, 115_200);
    assert!(opened[1].dtr_enable);

    bridge.stop();
    tokio::time::timeout(WAIT, bridge.wait_stopped()).await.unwrap();
}

#[tokio::test]
async fn test_observer_group_with_history() {
    let opener = Arc::new(MockTransportOpener::new());
    let up = opener.register(UP);
    let down = opener.register(DOWN);

    let history = Arc::new(LogHistory::new());
    let (forwarder, mut events) = EventForwarder::channel();
    let group = ObserverGroup::new()
        .with(history.clone())
        .with(Arc::new(forwarder));
    let bridge = SerialBridge::new(opener.clone(), Arc::new(group));
    start(&bridge, false).await;

    up.push_read(b"ABC");
    tokio::time::timeout(WAIT, down.wait_for_writes(1)).await.unwrap();

    bridge.stop();
    tokio::time::timeout(WAIT, until_stopped(&mut events))
        .await
        .unwrap();

    let entries = history.snapshot();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].to_line().ends_with("\tTX\t3\t41 42 43\tABC"));
}
