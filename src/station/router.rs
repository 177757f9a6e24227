//! Inbound message routing.
//!
//! For every decoded text message:
//!
//! 1. record the sender's telemetry, whatever the message says
//! 2. stop if it arrived on the default channel (index 0)
//! 3. normalise the text and pick the first matching responder
//! 4. stop quietly if nothing matched
//! 5. run the responder and queue its reply on the originating channel
//!
//! A responder error never escapes the router: it is logged and replaced by
//! one short user-facing message. Replies are handed to the outbound queue,
//! so pacing between parts never holds up the next inbound message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::chunker::AlertChunker;
use super::dispatch::{Origin, OutboundBatch, OutboundQueue};
use super::responders::{Command, ReplyContext, Responder, ResponderSet};
use super::status::StatusSnapshot;
use super::weather::WeatherProvider;
use crate::logutil::escape_log;
use crate::meshtastic::{InboundMessage, NodeId, Position};
use crate::metrics;
use crate::schedule::ScheduledRule;
use crate::telemetry::NodeRegistry;

/// Channel index reserved for public chatter. Never answered.
pub const DEFAULT_CHANNEL: u32 = 0;
pub const DEFAULT_LOCATION_LABEL: &str = "here";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Default channel: telemetry recorded, nothing else.
    DefaultChannel,
    /// Text matched no responder.
    NoMatch,
    Replied { responder: Responder, parts: usize },
    /// The responder failed and an error reply was queued instead.
    Failed { responder: Responder },
    /// The outbound queue refused the reply (or the error reply).
    Dropped { responder: Responder },
}

pub struct MessageRouter {
    responders: ResponderSet,
    registry: Arc<NodeRegistry>,
    queue: OutboundQueue,
    chunker: AlertChunker,
    weather: Option<Arc<dyn WeatherProvider>>,
    rules: Vec<ScheduledRule>,
    location_label: String,
    position: Option<Position>,
    own_node: Option<NodeId>,
    own_position: Option<Position>,
}

impl MessageRouter {
    pub fn new(registry: Arc<NodeRegistry>, queue: OutboundQueue, chunker: AlertChunker) -> Self {
        Self {
            responders: ResponderSet::standard(false),
            registry,
            queue,
            chunker,
            weather: None,
            rules: Vec::new(),
            location_label: DEFAULT_LOCATION_LABEL.to_string(),
            position: None,
            own_node: None,
            own_position: None,
        }
    }

    pub fn with_weather(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(provider);
        self
    }

    /// Rule definitions for `?reminders`. Firing state stays with the scheduler.
    pub fn with_rules(mut self, rules: Vec<ScheduledRule>) -> Self {
        self.responders = ResponderSet::standard(!rules.is_empty());
        self.rules = rules;
        self
    }

    pub fn with_location(mut self, label: Option<String>, position: Option<Position>) -> Self {
        if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
            self.location_label = label;
        }
        self.position = position;
        self
    }

    pub fn set_own_node(&mut self, node: NodeId) {
        self.own_node = Some(node);
    }

    /// Position the radio reported for itself.
    pub fn set_own_position(&mut self, position: Position) {
        self.own_position = Some(position);
    }

    pub fn responders(&self) -> &ResponderSet {
        &self.responders
    }

    /// Configured coordinates win over the station node's reported position.
    pub fn location(&self) -> Option<Position> {
        self.position.or(self.own_position).or_else(|| {
            self.own_node
                .and_then(|node| self.registry.position_of(node))
        })
    }

    pub async fn handle(&self, msg: &InboundMessage, status: StatusSnapshot) -> RouteOutcome {
        self.handle_at(msg, status, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        msg: &InboundMessage,
        status: StatusSnapshot,
        now: DateTime<Utc>,
    ) -> RouteOutcome {
        self.registry.record(msg.telemetry());

        if msg.channel == DEFAULT_CHANNEL {
            debug!(
                "Default channel text from {} ignored: {}",
                msg.sender_label(),
                escape_log(&msg.text)
            );
            return RouteOutcome::DefaultChannel;
        }

        let cmd = Command::parse(&msg.text);
        let Some(responder) = self.responders.select(&cmd) else {
            debug!(
                "No responder for text from {} on ch={}: {}",
                msg.sender_label(),
                msg.channel,
                escape_log(&msg.text)
            );
            return RouteOutcome::NoMatch;
        };

        metrics::inc_commands_handled();
        info!(
            "{} request from {} ({}) on ch={}",
            responder,
            msg.sender_label(),
            msg.sender,
            msg.channel
        );

        let ctx = ReplyContext {
            registry: &self.registry,
            weather: self.weather.as_deref(),
            location: self.location(),
            location_label: &self.location_label,
            rules: &self.rules,
            status,
            chunker: self.chunker,
            now,
        };
        match self.responders.respond(responder, &ctx, msg, &cmd).await {
            Ok(reply) => {
                let parts: Vec<String> = reply
                    .into_parts()
                    .iter()
                    .flat_map(|part| self.chunker.split_message(part))
                    .collect();
                let count = parts.len();
                if self
                    .queue
                    .enqueue(OutboundBatch::new(msg.channel, parts, Origin::Reply))
                {
                    RouteOutcome::Replied {
                        responder,
                        parts: count,
                    }
                } else {
                    RouteOutcome::Dropped { responder }
                }
            }
            Err(e) => {
                metrics::inc_responder_failures();
                warn!(
                    "{} responder failed for {} on ch={}: {}",
                    responder,
                    msg.sender_label(),
                    msg.channel,
                    e
                );
                if self.queue.enqueue(OutboundBatch::single(
                    msg.channel,
                    e.user_message(),
                    Origin::Reply,
                )) {
                    RouteOutcome::Failed { responder }
                } else {
                    RouteOutcome::Dropped { responder }
                }
            }
        }
    }
}
