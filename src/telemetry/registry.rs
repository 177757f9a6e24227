//! Last-seen telemetry per node, with hop-grouped summaries for net reports.
//!
//! Every packet the station hears is recorded here, command or not. Entries
//! are never deleted on read; they fall out of reports once older than the
//! requested window and are physically dropped by [`NodeRegistry::prune`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::meshtastic::{NodeId, Position};

/// Window used by net reports and by the default retention.
pub const NET_WINDOW_HOURS: i64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeTelemetry {
    pub node: NodeId,
    pub name: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub hops: u32,
    pub rssi: Option<i32>,
    pub snr: Option<f32>,
    pub position: Option<Position>,
}

impl NodeTelemetry {
    pub fn new(node: NodeId, last_seen: DateTime<Utc>, hops: u32) -> Self {
        Self {
            node,
            name: None,
            last_seen,
            hops,
            rssi: None,
            snr: None,
            position: None,
        }
    }
}

/// Nodes seen at one hop distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopGroup {
    pub hops: u32,
    pub count: usize,
    pub names: Vec<String>,
}

/// Read-only view of recently active nodes, ascending by hop count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetSnapshot {
    pub groups: Vec<HopGroup>,
}

impl NetSnapshot {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

#[derive(Debug)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, NodeTelemetry>>,
    retention: Duration,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(Duration::hours(NET_WINDOW_HOURS))
    }
}

impl NodeRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Upsert by node id. A sighting without a name or position keeps the
    /// last known one; every other field is overwritten.
    pub fn record(&self, mut telemetry: NodeTelemetry) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = nodes.get(&telemetry.node) {
            if telemetry.name.is_none() {
                telemetry.name = previous.name.clone();
            }
            if telemetry.position.is_none() {
                telemetry.position = previous.position;
            }
        }
        nodes.insert(telemetry.node, telemetry);
    }

    pub fn get(&self, node: NodeId) -> Option<NodeTelemetry> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes.get(&node).cloned()
    }

    pub fn position_of(&self, node: NodeId) -> Option<Position> {
        self.get(node).and_then(|t| t.position)
    }

    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self, max_age: Duration) -> NetSnapshot {
        self.snapshot_at(max_age, Utc::now())
    }

    /// Group nodes seen within `max_age` of `now` by hop count.
    pub fn snapshot_at(&self, max_age: Duration, now: DateTime<Utc>) -> NetSnapshot {
        let cutoff = now - max_age;
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_hops: BTreeMap<u32, HopGroup> = BTreeMap::new();
        for telemetry in nodes.values().filter(|t| t.last_seen >= cutoff) {
            let group = by_hops.entry(telemetry.hops).or_insert_with(|| HopGroup {
                hops: telemetry.hops,
                count: 0,
                names: Vec::new(),
            });
            group.count += 1;
            if let Some(name) = &telemetry.name {
                group.names.push(name.clone());
            }
        }
        let mut groups: Vec<HopGroup> = by_hops.into_values().collect();
        for group in &mut groups {
            group.names.sort();
        }
        NetSnapshot { groups }
    }

    /// Drop entries older than the retention window. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let before = nodes.len();
        nodes.retain(|_, t| t.last_seen >= cutoff);
        before - nodes.len()
    }
}
