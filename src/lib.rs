//! # check-mate - Radio check bot for Meshtastic networks
//!
//! check-mate connects to a Meshtastic node over its TCP API and answers short
//! `?` commands on secondary channels: signal reports, a network summary,
//! station status, weather and alerts. It can also post scheduled
//! announcements (net reminders and the like) on a weekly timetable.
//!
//! ## Features
//!
//! - **Signal reports**: `?check` and radio-check phrases answered with hop count, RSSI and SNR.
//! - **Net report**: `?net` groups recently heard nodes by hop distance.
//! - **Weather**: `?weather` and `?alerts` via OpenWeatherMap, cached and chunked to packet size.
//! - **Scheduled messages**: timezone-aware weekly announcements.
//! - **Status file**: `status.json` for supervisors, plus an optional health-check ping.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use checkmate::config::Config;
//! use checkmate::station::run_station;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     run_station(config).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`station`] - Routing, responders, outbound pacing and the service loop
//! - [`meshtastic`] - TCP link to the radio and packet decoding
//! - [`telemetry`] - Per-node signal history and quality scoring
//! - [`schedule`] - Scheduled announcement rules and their ticker
//! - [`config`] - Configuration file, environment overrides and validation
//! - [`protobuf`] - Meshtastic protocol buffer messages
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Station      │ ← Routing, replies, status
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Meshtastic    │ ← TCP link, framing, decoding
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Telemetry     │ ← Who was heard, how well
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod meshtastic;
pub mod metrics;
pub mod protobuf;
pub mod schedule;
pub mod station;
pub mod telemetry;
