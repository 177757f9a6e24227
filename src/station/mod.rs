//! # Station
//!
//! The command-answering side of check-mate.
//!
//! - [`router`] - picks a responder for each inbound message
//! - [`responders`] - the commands themselves
//! - [`dispatch`] - the single paced outbound queue
//! - [`chunker`] - splits long replies into numbered fragments
//! - [`weather`] - weather provider seam and the OpenWeatherMap client
//! - [`status`] / [`health`] - status file and health-check pings
//! - [`server`] - the event loop tying it all to the radio

pub mod chunker;
pub mod dispatch;
pub mod health;
pub mod responders;
pub mod router;
pub mod server;
pub mod status;
pub mod weather;

pub use router::{MessageRouter, RouteOutcome};
pub use server::{run_station, StationServer};
