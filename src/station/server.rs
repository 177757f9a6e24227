//! The station service loop.
//!
//! [`run_station`] wires everything together:
//!
//! ```text
//! radio ──TCP──> reader ──MeshEvent──> StationServer ──> MessageRouter ─┐
//!                                           │                           ├─> OutboundQueue ─> dispatcher ─> writer ─> radio
//!                                           └── NodeRegistry   Scheduler ┘
//! ```
//!
//! The server owns the live [`StatusTracker`] and writes `status.json` on a
//! housekeeping tick. When the radio goes quiet it first sends a heartbeat
//! probe and later reports `unknown`. Losing the TCP link ends the loop with
//! an error; reconnecting is left to the process supervisor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::chunker::AlertChunker;
use super::dispatch::{self, start_dispatcher};
use super::health::HealthReporter;
use super::router::MessageRouter;
use super::status::{Status, StatusManager, StatusTracker};
use super::weather::OpenWeatherMap;
use crate::config::Config;
use crate::meshtastic::{self, MeshEvent, MeshLink, TcpLink};
use crate::metrics;
use crate::schedule::{spawn_scheduler, Scheduler};
use crate::telemetry::NodeRegistry;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(5);
const PRUNE_EVERY_MINUTES: i64 = 10;
const METRICS_LOG_EVERY_MINUTES: i64 = 1;

/// What the silence since the radio was last heard calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// Quiet long enough to ask the radio for a heartbeat.
    Probe,
    /// Quiet long enough that the status is no longer trustworthy.
    Unresponsive,
}

#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub probe_after: chrono::Duration,
    pub unhealthy_after: chrono::Duration,
}

impl ProbePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            probe_after: chrono::Duration::seconds(config.mesh.probe_after_secs as i64),
            unhealthy_after: chrono::Duration::seconds(config.mesh.unhealthy_after_secs as i64),
        }
    }
}

pub struct StationServer {
    router: MessageRouter,
    registry: Arc<NodeRegistry>,
    tracker: StatusTracker,
    status_file: StatusManager,
    health: Option<HealthReporter>,
    probes: ProbePolicy,
    last_probe: Option<DateTime<Utc>>,
    last_prune: DateTime<Utc>,
    last_metrics_log: DateTime<Utc>,
}

impl StationServer {
    pub fn new(
        router: MessageRouter,
        registry: Arc<NodeRegistry>,
        status_file: StatusManager,
        probes: ProbePolicy,
        started: DateTime<Utc>,
    ) -> Self {
        Self {
            router,
            registry,
            tracker: StatusTracker::new(started),
            status_file,
            health: None,
            probes,
            last_probe: None,
            last_prune: started,
            last_metrics_log: started,
        }
    }

    pub fn with_health(mut self, health: HealthReporter) -> Self {
        self.health = Some(health);
        self
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub async fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        if self.tracker.set(status) {
            info!("Status changed to {}", status);
            self.write_status(now).await;
        }
    }

    async fn write_status(&self, now: DateTime<Utc>) {
        let record = self.tracker.record(now, self.registry.len());
        if let Err(e) = self.status_file.write(&record).await {
            warn!("Failed to write status file: {}", e);
        }
    }

    /// Apply one event from the radio. An error means the link is gone.
    pub async fn handle_event(&mut self, event: MeshEvent, now: DateTime<Utc>) -> Result<()> {
        if let MeshEvent::Disconnected(reason) = event {
            self.set_status(Status::Disconnected, now).await;
            return Err(anyhow!("Meshtastic link lost: {}", reason));
        }

        self.tracker.device_heard(now);
        self.last_probe = None;
        if matches!(
            self.tracker.status(),
            Status::Connected | Status::Probing | Status::Unknown
        ) {
            self.set_status(Status::Active, now).await;
        }

        match event {
            MeshEvent::MyInfo(node) => {
                info!("Station node is {}", node);
                self.router.set_own_node(node);
            }
            MeshEvent::StationPosition(position) => {
                debug!(
                    "Station position {:.4}, {:.4}",
                    position.latitude, position.longitude
                );
                self.router.set_own_position(position);
            }
            MeshEvent::ConfigComplete => {
                info!(
                    "Node database loaded ({} nodes heard recently)",
                    self.registry.len()
                );
                self.set_status(Status::Active, now).await;
            }
            MeshEvent::Sighting(telemetry) => {
                metrics::inc_packets_received();
                self.tracker.count_packet(false);
                self.registry.record(telemetry);
                self.ping_health();
            }
            MeshEvent::Text(msg) => {
                metrics::inc_packets_received();
                metrics::inc_text_messages();
                self.tracker.count_packet(true);
                self.ping_health();
                let outcome = self
                    .router
                    .handle_at(&msg, self.tracker.snapshot(), now)
                    .await;
                debug!("Routed text from {}: {:?}", msg.sender, outcome);
            }
            MeshEvent::Disconnected(_) => {}
        }
        Ok(())
    }

    fn ping_health(&mut self) {
        if let Some(health) = self.health.as_mut() {
            health.ping();
        }
    }

    /// Decide whether radio silence calls for a probe or a status downgrade.
    /// Probes repeat at most once per `probe_after` while the silence lasts.
    pub fn liveness(&self, now: DateTime<Utc>) -> Liveness {
        let Some(last) = self.tracker.last_device_ping() else {
            return Liveness::Healthy;
        };
        let silence = now.signed_duration_since(last);
        if silence >= self.probes.unhealthy_after {
            Liveness::Unresponsive
        } else if silence >= self.probes.probe_after
            && self
                .last_probe
                .map_or(true, |p| now.signed_duration_since(p) >= self.probes.probe_after)
        {
            Liveness::Probe
        } else {
            Liveness::Healthy
        }
    }

    /// Periodic work: liveness probes, registry pruning, status file.
    pub async fn housekeeping(&mut self, now: DateTime<Utc>, link: Option<&TcpLink>) {
        match self.liveness(now) {
            Liveness::Healthy => {}
            Liveness::Probe => {
                self.last_probe = Some(now);
                if let Some(link) = link {
                    debug!("Radio quiet, sending heartbeat probe");
                    if let Err(e) = link.heartbeat() {
                        warn!("Failed to queue heartbeat probe: {}", e);
                    }
                }
                if self.tracker.status() == Status::Active {
                    self.set_status(Status::Probing, now).await;
                }
            }
            Liveness::Unresponsive => {
                if self.tracker.status() != Status::Unknown {
                    warn!("No traffic from the radio; status unknown");
                }
                self.set_status(Status::Unknown, now).await;
            }
        }

        if now.signed_duration_since(self.last_prune) >= chrono::Duration::minutes(PRUNE_EVERY_MINUTES) {
            let removed = self.registry.prune(now);
            if removed > 0 {
                debug!("Pruned {} stale node(s)", removed);
            }
            self.last_prune = now;
        }

        if now.signed_duration_since(self.last_metrics_log)
            >= chrono::Duration::minutes(METRICS_LOG_EVERY_MINUTES)
        {
            let m = metrics::snapshot();
            debug!(
                "metrics: packets={} texts={} commands={} failures={} replies={} send_failures={} dropped={} scheduled={}",
                m.packets_received,
                m.text_messages,
                m.commands_handled,
                m.responder_failures,
                m.replies_sent,
                m.send_failures,
                m.outbound_dropped,
                m.scheduled_fired
            );
            self.last_metrics_log = now;
        }

        self.write_status(now).await;
    }

    /// Drive the station until the link drops or Ctrl-C.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<MeshEvent>,
        link: TcpLink,
    ) -> Result<()> {
        self.set_status(Status::Connected, Utc::now()).await;

        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let event = event.unwrap_or_else(|| {
                        MeshEvent::Disconnected("event channel closed".to_string())
                    });
                    self.handle_event(event, Utc::now()).await?;
                }
                _ = housekeeping.tick() => {
                    self.housekeeping(Utc::now(), Some(&link)).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.set_status(Status::Shutdown, Utc::now()).await;
        link.shutdown();
        Ok(())
    }
}

/// Connect to the radio and run the station until shutdown.
pub async fn run_station(config: Config) -> Result<()> {
    config.validate()?;
    let rules = config.scheduled_rules()?;
    let started = Utc::now();

    let status_file = StatusManager::new(config.status_dir());
    info!("Status file: {}", status_file.path().display());
    let mut tracker = StatusTracker::new(started);
    status_file.write(&tracker.record(started, 0)).await?;

    let connection = match meshtastic::connect(
        &config.mesh.host,
        config.mesh.port,
        Duration::from_secs(config.mesh.connect_timeout_secs),
    )
    .await
    {
        Ok(connection) => connection,
        Err(e) => {
            tracker.set(Status::Disconnected);
            status_file.write(&tracker.record(Utc::now(), 0)).await?;
            return Err(e.into());
        }
    };

    let registry = Arc::new(NodeRegistry::default());
    let chunker = AlertChunker::new(config.mesh.max_payload_bytes);
    let link: Arc<dyn MeshLink> = Arc::new(connection.link.clone());
    let (queue, dispatcher) = start_dispatcher(
        dispatch::DispatchConfig {
            pacing: config.pacing(),
            queue_capacity: config.dispatch.queue_capacity,
        },
        link,
    );

    let scheduler = if rules.is_empty() {
        info!("No scheduled messages configured");
        None
    } else {
        Some(spawn_scheduler(
            Scheduler::new(rules.clone(), Duration::from_secs(config.schedule.tick_seconds)),
            queue.clone(),
            chunker,
        ))
    };

    let mut router = MessageRouter::new(registry.clone(), queue, chunker)
        .with_rules(rules)
        .with_location(config.station.location.clone(), config.station_position());
    if config.weather.api_key.trim().is_empty() {
        info!("No weather API key; weather commands will report not configured");
    } else {
        router = router.with_weather(Arc::new(OpenWeatherMap::new(
            config.weather.api_key.clone(),
            Duration::from_secs(config.weather.timeout_seconds),
            Duration::from_secs(config.weather.cache_ttl_minutes * 60),
        )));
    }

    let mut server = StationServer::new(
        router,
        registry,
        status_file,
        ProbePolicy::from_config(&config),
        started,
    );
    if let Some(url) = config.health.url.clone() {
        info!("Health check pings enabled");
        server = server.with_health(HealthReporter::new(
            url,
            Duration::from_secs(config.health.throttle_seconds),
            Duration::from_secs(config.health.timeout_seconds),
        ));
    }

    let result = server.run(connection.events, connection.link).await;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    dispatcher.abort();
    connection.reader.abort();
    // give the writer a moment to send the disconnect request
    let _ = tokio::time::timeout(Duration::from_secs(1), connection.writer).await;
    result
}
