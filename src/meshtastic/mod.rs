//! # Meshtastic Device Communication Module
//!
//! The station talks to a Meshtastic node over its TCP API (port 4403 by
//! default). This module owns the wire side of that conversation and turns
//! device traffic into plain Rust events for the rest of the crate.
//!
//! ## Layout
//!
//! - [`framer`] - `0x94 0xC3` length-prefixed stream framing
//! - [`decoder`] - `FromRadio` protobufs into [`MeshEvent`]s, plus the node name table
//! - [`tcp`] - connection setup and the reader/writer tasks
//!
//! ## Sending
//!
//! Everything that leaves the station goes through the [`MeshLink`] seam.
//! The TCP implementation hands the text to the writer task and returns at
//! once; delivery over the radio is best effort.
//!
//! ```toml
//! [mesh]
//! host = "meshtastic.local"
//! port = 4403
//! ```

pub mod decoder;
pub mod framer;
pub mod tcp;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::telemetry::NodeTelemetry;

pub use tcp::{connect, MeshConnection, TcpLink};

pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;
pub const DEFAULT_TCP_PORT: u16 = 4403;
/// Hop limit stamped on outgoing packets.
pub const DEFAULT_HOP_LIMIT: u32 = 3;

/// Node number as assigned by the radio. Displays as `!` plus eight hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Build from the radio's 1e-7 degree integers. `(0, 0)` means "no fix".
    pub fn from_fixed(latitude_i: i32, longitude_i: i32) -> Option<Self> {
        if latitude_i == 0 && longitude_i == 0 {
            return None;
        }
        let position = Self {
            latitude: latitude_i as f64 * 1e-7,
            longitude: longitude_i as f64 * 1e-7,
        };
        position.is_valid().then_some(position)
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A decoded text packet. Built once per packet and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender: NodeId,
    pub sender_name: Option<String>,
    pub channel: u32,
    pub hops: u32,
    pub rssi: i32,
    pub snr: f32,
    pub position: Option<Position>,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Short name when the node database has one, otherwise the node id.
    pub fn sender_label(&self) -> String {
        match &self.sender_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.sender.to_string(),
        }
    }

    pub fn telemetry(&self) -> NodeTelemetry {
        NodeTelemetry {
            node: self.sender,
            name: self.sender_name.clone(),
            last_seen: self.received_at,
            hops: self.hops,
            rssi: Some(self.rssi),
            snr: Some(self.snr),
            position: self.position,
        }
    }
}

/// Everything the reader task reports to the station.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    /// The radio told us its own node number.
    MyInfo(NodeId),
    /// Initial node database download finished.
    ConfigComplete,
    /// Position from the station node's own node-database entry.
    StationPosition(Position),
    /// A text message on any channel.
    Text(InboundMessage),
    /// Any other sign of life from a node (position, node info, telemetry).
    Sighting(NodeTelemetry),
    /// The link to the radio is gone.
    Disconnected(String),
}

/// Outgoing text for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub channel: u32,
    pub text: String,
}

/// Control messages for the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Heartbeat,
    Shutdown,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("mesh link closed")]
    Closed,
    #[error("frame payload of {0} bytes exceeds the radio limit")]
    FrameTooLarge(usize),
    #[error("protobuf encode failed: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Send seam between the station and the radio.
pub trait MeshLink: Send + Sync {
    /// Queue `text` for broadcast on `channel`. Returns once the transport has
    /// accepted it, not when the radio has delivered it.
    fn send_text(&self, channel: u32, text: &str) -> Result<(), TransportError>;
}
