//! Bounded frame queue
//!
//! The only hand-off point between a reader and a writer. Producers never
//! wait: [`FrameSender::try_push`] either enqueues or hands the frame back.
//! The single consumer waits in [`FrameReceiver::pop`], which is
//! cancellation-safe and can be raced against a cancellation token.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::frame::Frame;

/// Why a frame could not be enqueued
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError {
    /// Queue at capacity; the frame is returned
    Full(Frame),
    /// Consumer has gone away; the frame is returned
    Closed(Frame),
}

impl TryPushError {
    /// Recover the rejected frame
    pub fn into_frame(self) -> Frame {
        match self {
            TryPushError::Full(frame) | TryPushError::Closed(frame) => frame,
        }
    }
}

/// Create a queue holding at most `capacity` frames
///
/// # Panics
///
/// Panics if `capacity` is zero; [`crate::BridgeConfig::validate`] rejects
/// that before a session is created.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Producer side of a frame queue
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    /// Enqueue without waiting
    pub fn try_push(&self, frame: Frame) -> Result<(), TryPushError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(frame) => TryPushError::Full(frame),
            TrySendError::Closed(frame) => TryPushError::Closed(frame),
        })
    }

    /// A depth gauge that does not keep the queue open
    pub fn gauge(&self) -> QueueGauge {
        QueueGauge {
            tx: self.tx.downgrade(),
        }
    }
}

/// Read-only view of a queue's depth
///
/// Holding a gauge does not count as a producer, so a queue still closes
/// once every [`FrameSender`] is gone.
#[derive(Debug, Clone)]
pub struct QueueGauge {
    tx: mpsc::WeakSender<Frame>,
}

impl QueueGauge {
    /// Frames currently waiting; zero once the queue is gone
    pub fn depth(&self) -> usize {
        self.tx
            .upgrade()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }
}

/// Consumer side of a frame queue
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
}

impl FrameReceiver {
    /// Wait for the next frame; `None` once the queue is closed and drained
    pub async fn pop(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Refuse further pushes; frames already queued can still be popped
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> Frame {
        Frame::copy_from_slice(&[byte])
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = frame_queue(4);
        for b in 0..4 {
            tx.try_push(frame(b)).unwrap();
        }
        for b in 0..4 {
            assert_eq!(rx.pop().await.unwrap().as_bytes(), &[b]);
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (tx, _rx) = frame_queue(2);
        tx.try_push(frame(1)).unwrap();
        tx.try_push(frame(2)).unwrap();
        assert_eq!(tx.gauge().depth(), 2);

        let err = tx.try_push(frame(3)).unwrap_err();
        assert!(matches!(err, TryPushError::Full(_)));
        assert_eq!(err.into_frame().as_bytes(), &[3]);
        assert_eq!(tx.gauge().depth(), 2);
    }

    #[tokio::test]
    async fn test_close_rejects_pushes_but_drains() {
        let (tx, mut rx) = frame_queue(4);
        tx.try_push(frame(1)).unwrap();
        rx.close();

        assert!(matches!(
            tx.try_push(frame(2)),
            Err(TryPushError::Closed(_))
        ));
        assert_eq!(rx.pop().await.unwrap().as_bytes(), &[1]);
        assert!(rx.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_gauge_tracks_depth_without_holding_queue_open() {
        let (tx, mut rx) = frame_queue(8);
        let gauge = tx.gauge();
        tx.try_push(frame(1)).unwrap();
        tx.try_push(frame(2)).unwrap();
        assert_eq!(gauge.depth(), 2);

        rx.pop().await.unwrap();
        assert_eq!(gauge.depth(), 1);

        drop(tx);
        assert_eq!(rx.pop().await.unwrap().as_bytes(), &[2]);
        assert!(rx.pop().await.is_none());
        assert_eq!(gauge.depth(), 0);
    }
}
