//! Turn `FromRadio` frames into [`MeshEvent`]s.
//!
//! The decoder keeps the node-number to short-name table built from the
//! node database and from `NODEINFO_APP` broadcasts, so text events carry a
//! display name when one is known. It does no I/O and is driven by the
//! reader task one frame at a time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use prost::Message;

use super::{InboundMessage, MeshEvent, NodeId, Position};
use crate::logutil::escape_log;
use crate::protobuf::{self as proto, from_radio, mesh_packet, PortNum};
use crate::telemetry::NodeTelemetry;

#[derive(Debug, Default)]
pub struct PacketDecoder {
    names: HashMap<u32, String>,
    own_node: Option<u32>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_of(&self, node: NodeId) -> Option<&str> {
        self.names.get(&node.0).map(String::as_str)
    }

    pub fn known_names(&self) -> usize {
        self.names.len()
    }

    /// Decode one framed payload. Undecodable frames are logged and dropped.
    pub fn decode_frame(&mut self, frame: &[u8], now: DateTime<Utc>) -> Vec<MeshEvent> {
        match proto::FromRadio::decode(frame) {
            Ok(msg) => self.handle(msg, now),
            Err(e) => {
                debug!("Dropping undecodable FromRadio frame ({} bytes): {}", frame.len(), e);
                Vec::new()
            }
        }
    }

    pub fn handle(&mut self, msg: proto::FromRadio, now: DateTime<Utc>) -> Vec<MeshEvent> {
        match msg.payload_variant {
            Some(from_radio::PayloadVariant::MyInfo(info)) => {
                self.own_node = Some(info.my_node_num);
                vec![MeshEvent::MyInfo(NodeId(info.my_node_num))]
            }
            Some(from_radio::PayloadVariant::NodeInfo(info)) => self.node_info(info),
            Some(from_radio::PayloadVariant::ConfigCompleteId(id)) => {
                debug!("Received config_complete_id=0x{:08x}", id);
                vec![MeshEvent::ConfigComplete]
            }
            Some(from_radio::PayloadVariant::Rebooted(_)) => {
                vec![MeshEvent::Disconnected("radio rebooted".to_string())]
            }
            Some(from_radio::PayloadVariant::Packet(pkt)) => {
                self.packet(pkt, now).into_iter().collect()
            }
            None => Vec::new(),
        }
    }

    fn remember_user(&mut self, node: u32, user: &proto::User) -> Option<String> {
        let short = user.short_name.trim();
        let name = if short.is_empty() {
            user.long_name.trim()
        } else {
            short
        };
        if name.is_empty() {
            return None;
        }
        self.names.insert(node, name.to_string());
        Some(name.to_string())
    }

    fn node_info(&mut self, info: proto::NodeInfo) -> Vec<MeshEvent> {
        let name = info
            .user
            .as_ref()
            .and_then(|user| self.remember_user(info.num, user));
        let position = info.position.as_ref().and_then(position_of);

        let mut events = Vec::new();
        // The station's own entry often has no last_heard; its position still counts.
        if Some(info.num) == self.own_node {
            if let Some(position) = position {
                events.push(MeshEvent::StationPosition(position));
            }
        }
        // Entries the radio has never heard carry no useful recency.
        if info.last_heard == 0 {
            return events;
        }
        let Some(last_seen) = DateTime::from_timestamp(i64::from(info.last_heard), 0) else {
            return events;
        };
        let mut telemetry = NodeTelemetry::new(NodeId(info.num), last_seen, info.hops_away.unwrap_or(0));
        telemetry.name = name;
        telemetry.snr = Some(info.snr);
        telemetry.position = position;
        events.push(MeshEvent::Sighting(telemetry));
        events
    }

    fn packet(&mut self, pkt: proto::MeshPacket, now: DateTime<Utc>) -> Option<MeshEvent> {
        if Some(pkt.from) == self.own_node || pkt.from == 0 {
            return None;
        }
        let sender = NodeId(pkt.from);
        let hops = hop_count(&pkt);
        let mut telemetry = NodeTelemetry::new(sender, now, hops);
        telemetry.rssi = Some(pkt.rx_rssi);
        telemetry.snr = Some(pkt.rx_snr);

        let data = match &pkt.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => data,
            // Still proof the node is alive even if we cannot read it.
            _ => {
                telemetry.name = self.names.get(&pkt.from).cloned();
                return Some(MeshEvent::Sighting(telemetry));
            }
        };

        let port = PortNum::try_from(data.portnum).unwrap_or(PortNum::UnknownApp);
        match port {
            PortNum::TextMessageApp => {
                let text = String::from_utf8_lossy(&data.payload).into_owned();
                trace!(
                    "Text from {} ch={} hops={}: {}",
                    sender,
                    pkt.channel,
                    hops,
                    escape_log(&text)
                );
                Some(MeshEvent::Text(InboundMessage {
                    sender,
                    sender_name: self.names.get(&pkt.from).cloned(),
                    channel: pkt.channel,
                    hops,
                    rssi: pkt.rx_rssi,
                    snr: pkt.rx_snr,
                    position: None,
                    text,
                    received_at: now,
                }))
            }
            PortNum::NodeinfoApp => {
                if let Ok(user) = proto::User::decode(data.payload.as_slice()) {
                    telemetry.name = self.remember_user(pkt.from, &user);
                }
                Some(MeshEvent::Sighting(telemetry))
            }
            PortNum::PositionApp => {
                telemetry.name = self.names.get(&pkt.from).cloned();
                if let Ok(position) = proto::Position::decode(data.payload.as_slice()) {
                    telemetry.position = position_of(&position);
                }
                Some(MeshEvent::Sighting(telemetry))
            }
            _ => {
                telemetry.name = self.names.get(&pkt.from).cloned();
                Some(MeshEvent::Sighting(telemetry))
            }
        }
    }
}

/// Relays traversed: hops used from the starting budget. Older firmware
/// does not set `hop_start`, in which case the packet counts as direct.
pub fn hop_count(pkt: &proto::MeshPacket) -> u32 {
    if pkt.hop_start > 0 && pkt.hop_start >= pkt.hop_limit {
        pkt.hop_start - pkt.hop_limit
    } else {
        0
    }
}

fn position_of(position: &proto::Position) -> Option<Position> {
    match (position.latitude_i, position.longitude_i) {
        (Some(lat), Some(lon)) => Position::from_fixed(lat, lon),
        _ => None,
    }
}
