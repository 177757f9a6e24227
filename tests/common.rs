//! Shared fakes for the integration tests: a recording radio link, a canned
//! weather provider and message builders.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use checkmate::meshtastic::{InboundMessage, MeshLink, NodeId, Position, TransportError};
use checkmate::station::chunker::AlertChunker;
use checkmate::station::dispatch::{start_dispatcher, DispatchConfig, DispatchStats};
use checkmate::station::status::{Status, StatusSnapshot};
use checkmate::station::weather::{Conditions, WeatherAlert, WeatherError, WeatherProvider};
use checkmate::station::MessageRouter;
use checkmate::telemetry::NodeRegistry;

pub const PACING: Duration = Duration::from_secs(2);

/// Records every text handed to the radio, with the (tokio) time it was sent.
#[derive(Default)]
pub struct RecordingLink {
    sent: Mutex<Vec<(Instant, u32, String)>>,
}

impl RecordingLink {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<(Instant, u32, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MeshLink for RecordingLink {
    fn send_text(&self, channel: u32, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), channel, text.to_string()));
        Ok(())
    }
}

/// Weather provider with canned answers. `None` conditions simulate an outage.
#[derive(Default)]
pub struct CannedWeather {
    pub conditions: Option<Conditions>,
    pub alerts: Vec<WeatherAlert>,
}

#[async_trait]
impl WeatherProvider for CannedWeather {
    async fn current(&self, _at: Position) -> Result<Conditions, WeatherError> {
        self.conditions.clone().ok_or(WeatherError::Timeout(10))
    }

    async fn alerts(&self, _at: Position) -> Result<Vec<WeatherAlert>, WeatherError> {
        if self.conditions.is_none() {
            return Err(WeatherError::Timeout(10));
        }
        Ok(self.alerts.clone())
    }
}

pub struct Harness {
    pub router: MessageRouter,
    pub registry: Arc<NodeRegistry>,
    pub link: Arc<RecordingLink>,
    pub dispatcher: JoinHandle<DispatchStats>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|router| router)
    }

    pub fn with(configure: impl FnOnce(MessageRouter) -> MessageRouter) -> Self {
        let registry = Arc::new(NodeRegistry::default());
        let link = Arc::new(RecordingLink::default());
        let (queue, dispatcher) = start_dispatcher(
            DispatchConfig {
                pacing: PACING,
                queue_capacity: 16,
            },
            link.clone(),
        );
        let router = configure(MessageRouter::new(
            registry.clone(),
            queue,
            AlertChunker::new(200),
        ));
        Self {
            router,
            registry,
            link,
            dispatcher,
        }
    }

    /// Drop the router (and its queue) and wait for everything to be sent.
    pub async fn finish(self) -> (Arc<RecordingLink>, DispatchStats) {
        drop(self.router);
        let stats = self.dispatcher.await.expect("dispatcher panicked");
        (self.link, stats)
    }
}

pub fn message(sender: u32, channel: u32, text: &str) -> InboundMessage {
    InboundMessage {
        sender: NodeId(sender),
        sender_name: None,
        channel,
        hops: 1,
        rssi: -90,
        snr: 4.0,
        position: None,
        text: text.to_string(),
        received_at: Utc::now(),
    }
}

pub fn active_status(started: DateTime<Utc>) -> StatusSnapshot {
    StatusSnapshot {
        status: Status::Active,
        started,
        packets: 10,
        messages: 3,
    }
}

pub fn portland() -> Position {
    Position {
        latitude: 45.5167,
        longitude: -122.68,
    }
}
