mod common;

use chrono::{Duration, Utc};

use checkmate::meshtastic::{MeshEvent, NodeId};
use checkmate::station::server::{Liveness, ProbePolicy, StationServer};
use checkmate::station::status::{Status, StatusManager, StatusTracker};
use checkmate::telemetry::NodeTelemetry;

use common::{message, Harness};

fn probes() -> ProbePolicy {
    ProbePolicy {
        probe_after: Duration::seconds(30),
        unhealthy_after: Duration::seconds(300),
    }
}

#[tokio::test]
async fn status_file_round_trips_and_missing_reads_unknown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = StatusManager::new(dir.path());

    let missing = manager.read().await.expect("read missing");
    assert_eq!(missing.status, Status::Unknown);
    assert!(missing.start_time.is_none());

    let started = Utc::now();
    let mut tracker = StatusTracker::new(started);
    tracker.set(Status::Active);
    tracker.count_packet(true);
    tracker.count_packet(false);
    manager
        .write(&tracker.record(started + Duration::seconds(5), 4))
        .await
        .expect("write");

    let record = manager.read().await.expect("read");
    assert_eq!(record.status, Status::Active);
    assert_eq!(record.user_count, Some(4));
    assert_eq!(record.packet_count, Some(2));
    assert_eq!(record.message_count, Some(1));

    let raw = std::fs::read_to_string(manager.path()).expect("raw json");
    assert!(raw.contains("\"status\":\"active\""));
}

#[tokio::test]
async fn corrupt_status_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = StatusManager::new(dir.path());
    std::fs::write(manager.path(), "{not json").expect("write");
    assert!(manager.read().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn events_drive_status_and_counters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::new();
    let registry = h.registry.clone();
    let started = Utc::now();
    let mut server = StationServer::new(
        h.router,
        registry.clone(),
        StatusManager::new(dir.path()),
        probes(),
        started,
    );
    server.set_status(Status::Connected, started).await;

    let now = started + Duration::seconds(1);
    server
        .handle_event(MeshEvent::MyInfo(NodeId(0x77)), now)
        .await
        .expect("my info");
    assert_eq!(server.tracker().status(), Status::Active);

    server
        .handle_event(
            MeshEvent::Sighting(NodeTelemetry::new(NodeId(0x42), now, 2)),
            now,
        )
        .await
        .expect("sighting");
    server
        .handle_event(MeshEvent::Text(message(0x43, 0, "hi all")), now)
        .await
        .expect("text");

    let snapshot = server.tracker().snapshot();
    assert_eq!(snapshot.packets, 2);
    assert_eq!(snapshot.messages, 1);
    assert_eq!(registry.len(), 2);

    let record = StatusManager::new(dir.path()).read().await.expect("read");
    assert_eq!(record.status, Status::Active);
}

#[tokio::test(start_paused = true)]
async fn silence_probes_then_goes_unknown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::new();
    let started = Utc::now();
    let mut server = StationServer::new(
        h.router,
        h.registry.clone(),
        StatusManager::new(dir.path()),
        probes(),
        started,
    );
    server
        .handle_event(MeshEvent::ConfigComplete, started)
        .await
        .expect("config complete");
    assert_eq!(server.tracker().status(), Status::Active);

    assert_eq!(server.liveness(started + Duration::seconds(10)), Liveness::Healthy);
    assert_eq!(server.liveness(started + Duration::seconds(31)), Liveness::Probe);

    server.housekeeping(started + Duration::seconds(31), None).await;
    assert_eq!(server.tracker().status(), Status::Probing);
    // one probe per quiet period
    assert_eq!(server.liveness(started + Duration::seconds(40)), Liveness::Healthy);

    server.housekeeping(started + Duration::seconds(301), None).await;
    assert_eq!(server.tracker().status(), Status::Unknown);
    let record = StatusManager::new(dir.path()).read().await.expect("read");
    assert_eq!(record.status, Status::Unknown);

    // any traffic brings it back
    server
        .handle_event(
            MeshEvent::Sighting(NodeTelemetry::new(NodeId(9), started, 1)),
            started + Duration::seconds(302),
        )
        .await
        .expect("sighting");
    assert_eq!(server.tracker().status(), Status::Active);
}

#[tokio::test(start_paused = true)]
async fn lost_link_is_fatal_and_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::new();
    let started = Utc::now();
    let mut server = StationServer::new(
        h.router,
        h.registry.clone(),
        StatusManager::new(dir.path()),
        probes(),
        started,
    );
    let result = server
        .handle_event(MeshEvent::Disconnected("connection reset".into()), started)
        .await;
    let err = result.expect_err("disconnect must end the loop");
    assert!(err.to_string().contains("connection reset"));

    let record = StatusManager::new(dir.path()).read().await.expect("read");
    assert_eq!(record.status, Status::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn station_position_feeds_weather_location() {
    let dir = tempfile::tempdir().expect("tempdir");
    let h = Harness::new();
    let started = Utc::now();
    let mut server = StationServer::new(
        h.router,
        h.registry.clone(),
        StatusManager::new(dir.path()),
        probes(),
        started,
    );
    assert_eq!(server.router().location(), None);
    server
        .handle_event(MeshEvent::StationPosition(common::portland()), started)
        .await
        .expect("station position");
    assert_eq!(server.router().location(), Some(common::portland()));
    // the station itself is not counted as a heard node
    assert!(h.registry.is_empty());
}
