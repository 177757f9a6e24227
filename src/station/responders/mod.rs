//! # Command Responders
//!
//! Each responder recognises one command and turns it into reply text.
//! They are a closed set, tried in a fixed order, and the first match wins:
//!
//! | order | responder   | trigger                                   |
//! |-------|-------------|-------------------------------------------|
//! | 1     | Help        | `?help`, `?help <command>`                |
//! | 2     | RadioCheck  | text containing "radio check"/"mesh check"|
//! | 3     | SignalCheck | `?check`                                  |
//! | 4     | Status      | `?status`                                 |
//! | 5     | NetStatus   | `?net`                                    |
//! | 6     | Weather     | `?weather`                                |
//! | 7     | Alerts      | `?alerts`                                 |
//! | 8     | Reminders   | `?reminders`, `?reminder`                 |
//!
//! Help comes first so that `?help radio check` asks about a command
//! instead of triggering one. Radio check is matched anywhere in the text
//! with spaces removed, so "Radio Check from the hill" matches; every `?`
//! command must be the whole message.
//!
//! Reminders is only registered when at least one scheduled rule exists.
//! Weather and Alerts are always registered so a user gets a
//! "not configured" reply, but Help only lists them when they can work.

mod alerts;
mod check;
mod help;
mod net;
mod radiocheck;
mod reminders;
mod status;
mod weather;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::chunker::AlertChunker;
use super::status::StatusSnapshot;
use super::weather::{WeatherError, WeatherProvider};
use crate::meshtastic::{InboundMessage, Position};
use crate::schedule::ScheduledRule;
use crate::telemetry::NodeRegistry;

pub use alerts::format_dms;
pub use radiocheck::acknowledgment;

/// Inbound text after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercase with every whitespace character removed.
    pub compact: String,
    /// Lowercase first word, when it starts with `?`.
    pub keyword: Option<String>,
    /// Lowercase words after the keyword, joined by single spaces.
    pub argument: Option<String>,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();
        let mut words = lower.split_whitespace();
        let keyword = words
            .next()
            .filter(|w| w.starts_with('?') && w.len() > 1)
            .map(str::to_string);
        let rest: Vec<&str> = words.collect();
        let argument = (keyword.is_some() && !rest.is_empty()).then(|| rest.join(" "));
        Self {
            compact,
            keyword,
            argument,
        }
    }

    /// A bare `?name` command with nothing after it.
    fn is(&self, name: &str) -> bool {
        self.argument.is_none() && self.keyword.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Responder {
    Help,
    RadioCheck,
    SignalCheck,
    Status,
    NetStatus,
    Weather,
    Alerts,
    Reminders,
}

impl Responder {
    /// Every responder, in match priority order.
    pub const PRIORITY: [Responder; 8] = [
        Responder::Help,
        Responder::RadioCheck,
        Responder::SignalCheck,
        Responder::Status,
        Responder::NetStatus,
        Responder::Weather,
        Responder::Alerts,
        Responder::Reminders,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Responder::Help => "help",
            Responder::RadioCheck => "radiocheck",
            Responder::SignalCheck => "check",
            Responder::Status => "status",
            Responder::NetStatus => "net",
            Responder::Weather => "weather",
            Responder::Alerts => "alerts",
            Responder::Reminders => "reminders",
        }
    }

    /// The `?command` word, for responders that have one.
    pub fn command(self) -> Option<&'static str> {
        match self {
            Responder::RadioCheck => None,
            other => Some(other.name()),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Responder::Help => "List available commands or get help on a specific command",
            Responder::RadioCheck => "Say \"radio check\" for a signal report",
            Responder::SignalCheck => "Radio check with hop count and signal quality",
            Responder::Status => "Show current status, uptime, and packet statistics",
            Responder::NetStatus => "Show network statistics for connected nodes",
            Responder::Weather => "Get current weather for the node's location",
            Responder::Alerts => "Get active weather alerts for the node's location",
            Responder::Reminders => "Show currently configured scheduled messages",
        }
    }

    pub fn matches(self, cmd: &Command) -> bool {
        match self {
            Responder::Help => cmd.keyword.as_deref() == Some("?help"),
            Responder::RadioCheck => {
                cmd.compact.contains("radiocheck") || cmd.compact.contains("meshcheck")
            }
            Responder::SignalCheck => cmd.is("?check"),
            Responder::Status => cmd.is("?status"),
            Responder::NetStatus => cmd.is("?net"),
            Responder::Weather => cmd.is("?weather"),
            Responder::Alerts => cmd.is("?alerts"),
            Responder::Reminders => cmd.is("?reminders") || cmd.is("?reminder"),
        }
    }
}

impl fmt::Display for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a responder produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Single(String),
    /// Ordered messages, sent with pacing between them.
    Sequence(Vec<String>),
}

impl Reply {
    pub fn into_parts(self) -> Vec<String> {
        match self {
            Reply::Single(text) => vec![text],
            Reply::Sequence(parts) => parts,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("{service} not configured: missing {missing}")]
    NotConfigured {
        service: &'static str,
        missing: &'static str,
    },
    #[error("weather lookup failed: {0}")]
    Weather(#[source] WeatherError),
    #[error("alerts lookup failed: {0}")]
    Alerts(#[source] WeatherError),
}

impl ResponderError {
    /// Text sent back to the user in place of the failed reply.
    pub fn user_message(&self) -> String {
        match self {
            ResponderError::NotConfigured { .. } => self.to_string(),
            ResponderError::Weather(_) => "Unable to fetch weather data. Try again later.".into(),
            ResponderError::Alerts(_) => "Unable to fetch weather alerts. Try again later.".into(),
        }
    }
}

/// Everything a responder may read while answering one message.
pub struct ReplyContext<'a> {
    pub registry: &'a NodeRegistry,
    pub weather: Option<&'a dyn WeatherProvider>,
    /// Configured coordinates, else the station node's last reported position.
    pub location: Option<Position>,
    /// Place name used in radio check replies.
    pub location_label: &'a str,
    pub rules: &'a [ScheduledRule],
    pub status: StatusSnapshot,
    pub chunker: AlertChunker,
    pub now: DateTime<Utc>,
}

impl ReplyContext<'_> {
    /// Weather provider and location, or the reason one is missing.
    fn weather_target(
        &self,
        service: &'static str,
    ) -> Result<(&dyn WeatherProvider, Position), ResponderError> {
        let provider = self.weather.ok_or(ResponderError::NotConfigured {
            service,
            missing: "API key",
        })?;
        let location = self.location.ok_or(ResponderError::NotConfigured {
            service,
            missing: "location",
        })?;
        Ok((provider, location))
    }

    fn weather_ready(&self) -> bool {
        self.weather.is_some() && self.location.is_some()
    }
}

/// The registered responders, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderSet {
    responders: Vec<Responder>,
}

impl ResponderSet {
    /// All responders; Reminders only when `has_rules`.
    pub fn standard(has_rules: bool) -> Self {
        let responders = Responder::PRIORITY
            .into_iter()
            .filter(|r| *r != Responder::Reminders || has_rules)
            .collect();
        Self { responders }
    }

    pub fn responders(&self) -> &[Responder] {
        &self.responders
    }

    /// First registered responder matching `cmd`.
    pub fn select(&self, cmd: &Command) -> Option<Responder> {
        self.responders.iter().copied().find(|r| r.matches(cmd))
    }

    /// `?` commands whose preconditions currently hold, sorted by name.
    pub fn available_commands(&self, ctx: &ReplyContext<'_>) -> Vec<&'static str> {
        let mut commands: Vec<&'static str> = self
            .responders
            .iter()
            .filter(|r| match r {
                Responder::Weather | Responder::Alerts => ctx.weather_ready(),
                Responder::Reminders => !ctx.rules.is_empty(),
                _ => true,
            })
            .filter_map(|r| r.command())
            .collect();
        commands.sort_unstable();
        commands
    }

    pub async fn respond(
        &self,
        responder: Responder,
        ctx: &ReplyContext<'_>,
        msg: &InboundMessage,
        cmd: &Command,
    ) -> Result<Reply, ResponderError> {
        let reply = match responder {
            Responder::Help => Reply::Single(help::reply(
                &self.available_commands(ctx),
                cmd.argument.as_deref(),
            )),
            Responder::RadioCheck => Reply::Single(radiocheck::reply(msg, ctx.location_label)),
            Responder::SignalCheck => Reply::Single(check::reply(msg)),
            Responder::Status => Reply::Single(status::reply(&ctx.status, ctx.now)),
            Responder::NetStatus => Reply::Single(net::reply(ctx.registry, ctx.now)),
            Responder::Weather => {
                let (provider, at) = ctx.weather_target("Weather service")?;
                let conditions = provider
                    .current(at)
                    .await
                    .map_err(ResponderError::Weather)?;
                Reply::Single(weather::reply(&conditions))
            }
            Responder::Alerts => {
                let (provider, at) = ctx.weather_target("Weather alerts service")?;
                let alerts = provider.alerts(at).await.map_err(ResponderError::Alerts)?;
                alerts::reply(at, &alerts, ctx.chunker)
            }
            Responder::Reminders => Reply::Single(reminders::reply(ctx.rules)),
        };
        Ok(reply)
    }
}
