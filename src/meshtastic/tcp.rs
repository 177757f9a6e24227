//! TCP connection to a Meshtastic node and its reader/writer tasks.
//!
//! [`connect`] opens the socket, splits it, and spawns two tasks:
//!
//! - the reader feeds socket bytes through [`FrameDecoder`] and
//!   [`PacketDecoder`] and forwards [`MeshEvent`]s to the station;
//! - the writer owns the write half, requests the node database once at
//!   startup, then encodes outgoing text and heartbeat probes.
//!
//! Either task reports a dead link as [`MeshEvent::Disconnected`]. There is
//! no reconnect here; the process exits and its supervisor restarts it.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::decoder::PacketDecoder;
use super::framer::{encode_frame, FrameDecoder};
use super::{
    ControlMessage, MeshEvent, MeshLink, OutgoingMessage, TransportError, BROADCAST_ADDR,
    DEFAULT_HOP_LIMIT,
};
use crate::logutil::escape_log;
use crate::metrics;
use crate::protobuf::{self as proto, mesh_packet, to_radio, PortNum};

/// Cloneable sending side of a live connection.
#[derive(Debug, Clone)]
pub struct TcpLink {
    outgoing_tx: mpsc::UnboundedSender<OutgoingMessage>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
}

impl TcpLink {
    /// Ask the writer to send a heartbeat so the radio proves it is alive.
    pub fn heartbeat(&self) -> Result<(), TransportError> {
        self.control_tx
            .send(ControlMessage::Heartbeat)
            .map_err(|_| TransportError::Closed)
    }

    pub fn shutdown(&self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
    }
}

impl MeshLink for TcpLink {
    fn send_text(&self, channel: u32, text: &str) -> Result<(), TransportError> {
        self.outgoing_tx
            .send(OutgoingMessage {
                channel,
                text: text.to_string(),
            })
            .map_err(|_| TransportError::Closed)
    }
}

pub struct MeshConnection {
    pub link: TcpLink,
    pub events: mpsc::UnboundedReceiver<MeshEvent>,
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

pub async fn connect(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<MeshConnection, TransportError> {
    let addr = format!("{}:{}", host, port);
    info!("Connecting to Meshtastic node at {}", addr);
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| TransportError::ConnectTimeout(addr.clone()))?
        .map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();

    let (events_tx, events) = mpsc::unbounded_channel();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let reader = MeshReader {
        stream: read_half,
        frames: FrameDecoder::new(),
        decoder: PacketDecoder::new(),
        events_tx: events_tx.clone(),
    };
    let writer = MeshWriter {
        stream: write_half,
        outgoing_rx,
        control_rx,
        events_tx,
    };
    info!("Connected to {}", addr);

    Ok(MeshConnection {
        link: TcpLink {
            outgoing_tx,
            control_tx,
        },
        events,
        reader: tokio::spawn(reader.run()),
        writer: tokio::spawn(writer.run()),
    })
}

struct MeshReader {
    stream: OwnedReadHalf,
    frames: FrameDecoder,
    decoder: PacketDecoder,
    events_tx: mpsc::UnboundedSender<MeshEvent>,
}

impl MeshReader {
    async fn run(mut self) {
        info!("Starting Meshtastic reader task");
        let mut buffer = [0u8; 1024];
        let reason = loop {
            match self.stream.read(&mut buffer).await {
                Ok(0) => break "connection closed by radio".to_string(),
                Ok(n) => {
                    self.frames.push(&buffer[..n]);
                    while let Some(frame) = self.frames.next_frame() {
                        for event in self.decoder.decode_frame(&frame, Utc::now()) {
                            if self.events_tx.send(event).is_err() {
                                debug!("Event receiver dropped; reader exiting");
                                return;
                            }
                        }
                    }
                }
                Err(e) => break format!("read failed: {}", e),
            }
        };
        warn!("Meshtastic reader stopping: {}", reason);
        let _ = self.events_tx.send(MeshEvent::Disconnected(reason));
    }
}

struct MeshWriter {
    stream: OwnedWriteHalf,
    outgoing_rx: mpsc::UnboundedReceiver<OutgoingMessage>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    events_tx: mpsc::UnboundedSender<MeshEvent>,
}

impl MeshWriter {
    async fn run(mut self) {
        info!("Starting Meshtastic writer task");
        let config_id = rand::random::<u32>().max(1);
        info!(
            "Requesting node database from radio (want_config_id=0x{:08x})",
            config_id
        );
        if let Err(e) = self.send_toradio(want_config(config_id)).await {
            self.fail(e);
            return;
        }

        loop {
            let result = tokio::select! {
                msg = self.outgoing_rx.recv() => match msg {
                    Some(msg) => self.send_text(&msg).await,
                    None => break,
                },
                ctrl = self.control_rx.recv() => match ctrl {
                    Some(ControlMessage::Heartbeat) => {
                        debug!("Sending heartbeat probe");
                        self.send_toradio(heartbeat()).await
                    }
                    Some(ControlMessage::Shutdown) | None => {
                        let _ = self.send_toradio(disconnect()).await;
                        break;
                    }
                },
            };
            if let Err(e) = result {
                self.fail(e);
                return;
            }
        }
        info!("Meshtastic writer task shutting down");
    }

    async fn send_text(&mut self, msg: &OutgoingMessage) -> Result<(), TransportError> {
        let packet = text_packet(msg.channel, &msg.text);
        match self.send_toradio(packet).await {
            // The link is fine; only this message is unsendable.
            Err(TransportError::FrameTooLarge(len)) => {
                metrics::inc_send_failures();
                warn!("Dropping {} byte text on ch={}: too large for one packet", len, msg.channel);
                return Ok(());
            }
            other => other?,
        }
        debug!(
            "Sent text on ch={} ({} bytes): {}",
            msg.channel,
            msg.text.len(),
            escape_log(&msg.text)
        );
        Ok(())
    }

    async fn send_toradio(&mut self, msg: proto::ToRadio) -> Result<(), TransportError> {
        let frame = encode_frame(&msg.encode_to_vec())?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn fail(&self, e: TransportError) {
        metrics::inc_send_failures();
        warn!("Meshtastic writer failed: {}", e);
        let _ = self
            .events_tx
            .send(MeshEvent::Disconnected(format!("write failed: {}", e)));
    }
}

fn want_config(id: u32) -> proto::ToRadio {
    proto::ToRadio {
        payload_variant: Some(to_radio::PayloadVariant::WantConfigId(id)),
    }
}

fn heartbeat() -> proto::ToRadio {
    proto::ToRadio {
        payload_variant: Some(to_radio::PayloadVariant::Heartbeat(proto::Heartbeat {
            nonce: rand::random(),
        })),
    }
}

fn disconnect() -> proto::ToRadio {
    proto::ToRadio {
        payload_variant: Some(to_radio::PayloadVariant::Disconnect(true)),
    }
}

/// Broadcast text packet on `channel`.
pub fn text_packet(channel: u32, text: &str) -> proto::ToRadio {
    let packet = proto::MeshPacket {
        to: BROADCAST_ADDR,
        channel,
        id: rand::random::<u32>().max(1),
        hop_limit: DEFAULT_HOP_LIMIT,
        want_ack: false,
        payload_variant: Some(mesh_packet::PayloadVariant::Decoded(proto::Data {
            portnum: PortNum::TextMessageApp as i32,
            payload: text.as_bytes().to_vec(),
        })),
        ..Default::default()
    };
    proto::ToRadio {
        payload_variant: Some(to_radio::PayloadVariant::Packet(packet)),
    }
}
