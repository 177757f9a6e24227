//! `?status`: service state, uptime and packet counts.

use chrono::{DateTime, Utc};

use crate::station::status::StatusSnapshot;

pub(super) fn reply(status: &StatusSnapshot, now: DateTime<Utc>) -> String {
    let uptime = now.signed_duration_since(status.started).num_seconds().max(0);
    format!(
        "{}. {}h {}m uptime. {} packets ({} msgs)",
        status.status,
        uptime / 3600,
        uptime % 3600 / 60,
        status.packets,
        status.messages
    )
}
