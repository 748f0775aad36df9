//! Frames and directions
//!
//! A [`Frame`] is exactly the bytes returned by one transport read. Frames are
//! never merged or split; cloning one is a reference-count bump.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Logical flow of a relayed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Read from the upstream port, written to the downstream port
    UpstreamToDownstream,
    /// Read from the downstream port, written to the upstream port
    DownstreamToUpstream,
}

impl Direction {
    /// Label used in relay logs ("TX" for upstream→downstream, "RX" otherwise)
    pub fn log_label(&self) -> &'static str {
        match self {
            Direction::UpstreamToDownstream => "TX",
            Direction::DownstreamToUpstream => "RX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::UpstreamToDownstream => write!(f, "upstream->downstream"),
            Direction::DownstreamToUpstream => write!(f, "downstream->upstream"),
        }
    }
}

/// One opaque chunk of bytes produced by a single transport read
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Copy a read buffer slice into a new frame
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Frame payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.data.len()).finish()
    }
}
