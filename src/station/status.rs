//! Service status: the live tracker and the `status.json` file.
//!
//! The file is for outside health checks (`check-mate status`, container
//! probes). It is rewritten by the station housekeeping tick and whenever
//! the status changes, via a temp file and rename so readers never see a
//! half-written document.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::fs;

pub const STATUS_FILENAME: &str = "status.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Connecting,
    Connected,
    Active,
    Disconnected,
    Probing,
    Restarting,
    Shutdown,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Active => "active",
            Status::Disconnected => "disconnected",
            Status::Probing => "probing",
            Status::Restarting => "restarting",
            Status::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk document. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_device_ping: Option<f64>,
}

impl StatusRecord {
    pub fn unknown() -> Self {
        Self {
            status: Status::Unknown,
            start_time: None,
            update_time: None,
            user_count: None,
            packet_count: None,
            message_count: None,
            last_device_ping: None,
        }
    }
}

fn unix_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

/// Point-in-time view used by `?status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: Status,
    pub started: DateTime<Utc>,
    pub packets: u64,
    pub messages: u64,
}

/// Live status owned by the station loop.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    status: Status,
    started: DateTime<Utc>,
    last_device_ping: Option<DateTime<Utc>>,
    packets: u64,
    messages: u64,
}

impl StatusTracker {
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            status: Status::Connecting,
            started,
            last_device_ping: None,
            packets: 0,
            messages: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns `true` when the status actually changed.
    pub fn set(&mut self, status: Status) -> bool {
        let changed = self.status != status;
        self.status = status;
        changed
    }

    /// Anything heard from the radio proves the link is alive.
    pub fn device_heard(&mut self, now: DateTime<Utc>) {
        self.last_device_ping = Some(now);
    }

    pub fn last_device_ping(&self) -> Option<DateTime<Utc>> {
        self.last_device_ping
    }

    pub fn count_packet(&mut self, is_text: bool) {
        self.packets += 1;
        if is_text {
            self.messages += 1;
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            started: self.started,
            packets: self.packets,
            messages: self.messages,
        }
    }

    pub fn record(&self, now: DateTime<Utc>, user_count: usize) -> StatusRecord {
        StatusRecord {
            status: self.status,
            start_time: Some(unix_seconds(self.started)),
            update_time: Some(unix_seconds(now)),
            user_count: Some(user_count),
            packet_count: Some(self.packets),
            message_count: Some(self.messages),
            last_device_ping: self.last_device_ping.map(unix_seconds),
        }
    }
}

/// Reads and writes `status.json` in one directory.
#[derive(Debug, Clone)]
pub struct StatusManager {
    dir: PathBuf,
}

impl StatusManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$HOME/.local/share/check-mate`, or a relative `check-mate-status`
    /// directory when there is no home.
    pub fn default_dir() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(".local").join("share").join("check-mate"),
            None => PathBuf::from("check-mate-status"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATUS_FILENAME)
    }

    pub async fn write(&self, record: &StatusRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            anyhow!(
                "Failed to create status directory {}: {}",
                self.dir.display(),
                e
            )
        })?;
        let json = serde_json::to_string(record)?;
        let tmp = self.dir.join(format!("{}.tmp", STATUS_FILENAME));
        fs::write(&tmp, json)
            .await
            .map_err(|e| anyhow!("Failed to write status file {}: {}", tmp.display(), e))?;
        fs::rename(&tmp, self.path())
            .await
            .map_err(|e| anyhow!("Failed to replace status file: {}", e))?;
        debug!("Status written to {} ({})", self.path().display(), record.status);
        Ok(())
    }

    /// A missing file reads as `unknown`; a corrupt one is an error.
    pub async fn read(&self) -> Result<StatusRecord> {
        let path = self.path();
        match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| anyhow!("Invalid JSON in status file {}: {}", path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Status file not found at {}", path.display());
                Ok(StatusRecord::unknown())
            }
            Err(e) => Err(anyhow!(
                "Failed to read status file {}: {}",
                path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&StatusRecord::unknown()).unwrap();
        assert_eq!(json, r#"{"status":"unknown"}"#);
        let back: StatusRecord = serde_json::from_str(r#"{"status":"probing"}"#).unwrap();
        assert_eq!(back.status, Status::Probing);
    }

    #[test]
    fn tracker_counts_packets_and_messages() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = StatusTracker::new(start);
        assert_eq!(tracker.status(), Status::Connecting);
        tracker.count_packet(false);
        tracker.count_packet(true);
        assert!(tracker.set(Status::Active));
        assert!(!tracker.set(Status::Active));

        let record = tracker.record(start + chrono::Duration::seconds(90), 4);
        assert_eq!(record.status, Status::Active);
        assert_eq!(record.packet_count, Some(2));
        assert_eq!(record.message_count, Some(1));
        assert_eq!(record.user_count, Some(4));
        assert_eq!(record.start_time, Some(1_704_067_200.0));
        assert_eq!(record.update_time, Some(1_704_067_290.0));
        assert_eq!(record.last_device_ping, None);
    }
}
