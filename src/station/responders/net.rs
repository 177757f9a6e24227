//! `?net`: how many nodes were heard recently, by hop distance.

use chrono::{DateTime, Duration, Utc};

use crate::telemetry::{NodeRegistry, NET_WINDOW_HOURS};

pub(super) fn reply(registry: &NodeRegistry, now: DateTime<Utc>) -> String {
    let snapshot = registry.snapshot_at(Duration::hours(NET_WINDOW_HOURS), now);
    if snapshot.is_empty() {
        return format!(
            "Net report! No active nodes seen in the last {}hrs.",
            NET_WINDOW_HOURS
        );
    }
    let mut lines = vec![format!("Net report! In the last {}hrs:", NET_WINDOW_HOURS)];
    for group in snapshot.groups.iter().filter(|g| g.count > 0) {
        let hops = match group.hops {
            1 => "1 hop".to_string(),
            n => format!("{} hops", n),
        };
        lines.push(format!(" - {} x {}", hops, group.count));
    }
    lines.join("\n")
}
