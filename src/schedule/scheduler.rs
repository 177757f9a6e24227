//! Tick loop that turns due rules into outbound announcements.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ScheduledRule;
use crate::logutil::escape_log;
use crate::metrics;
use crate::station::chunker::AlertChunker;
use crate::station::dispatch::{Origin, OutboundBatch, OutboundQueue};

pub const DEFAULT_TICK: Duration = Duration::from_secs(30);
/// Shortest due window. Covers the whole target minute, like an `HH:MM` match.
pub const MIN_DUE_WINDOW: Duration = Duration::from_secs(60);

/// A rule that came due on this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub rule: usize,
    pub channel: u32,
    pub text: String,
}

/// Owns the rules and their firing state.
#[derive(Debug)]
pub struct Scheduler {
    rules: Vec<ScheduledRule>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(rules: Vec<ScheduledRule>, tick: Duration) -> Self {
        Self { rules, tick }
    }

    pub fn rules(&self) -> &[ScheduledRule] {
        &self.rules
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// How long after its target time a rule still counts as due.
    ///
    /// Two ticks wide, so a tick that lands just before the target followed by
    /// one that wakes late still catches it. `last_fired` keeps it to one send.
    pub fn due_window(&self) -> Duration {
        self.tick.saturating_mul(2).max(MIN_DUE_WINDOW)
    }

    /// Collect every rule due at `now` and mark it fired for its local date.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Announcement> {
        let window =
            chrono::Duration::from_std(self.due_window()).unwrap_or(chrono::Duration::zero());
        let mut fired = Vec::new();
        for (index, rule) in self.rules.iter_mut().enumerate() {
            if let Some(date) = rule.due_date(now, window) {
                rule.mark_fired(date);
                fired.push(Announcement {
                    rule: index,
                    channel: rule.channel,
                    text: rule.message.clone(),
                });
            }
        }
        fired
    }
}

/// Run `scheduler` on its tick interval, pushing announcements into `queue`.
/// Long messages are split with `chunker` and sent as one paced batch.
pub fn spawn_scheduler(
    mut scheduler: Scheduler,
    queue: OutboundQueue,
    chunker: AlertChunker,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Scheduler started with {} rule(s), tick={}s",
            scheduler.rules().len(),
            scheduler.tick().as_secs()
        );
        for rule in scheduler.rules() {
            debug!("scheduled: {}", rule);
        }
        let mut interval = tokio::time::interval(scheduler.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            for announcement in scheduler.due(Utc::now()) {
                metrics::inc_scheduled_fired();
                info!(
                    "Sending scheduled message #{} on ch={}: {}",
                    announcement.rule + 1,
                    announcement.channel,
                    escape_log(&announcement.text)
                );
                let parts = chunker.split_message(&announcement.text);
                queue.enqueue(OutboundBatch::new(
                    announcement.channel,
                    parts,
                    Origin::Scheduled,
                ));
            }
        }
    })
}
