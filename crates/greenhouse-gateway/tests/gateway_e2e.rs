// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests over real loopback sockets.
//!
//! Registrations are sent unicast to the discovery socket so the tests do
//! not depend on multicast routing being available.

use greenhouse_gateway::{Gateway, GatewayConfig, GatewayHandle};
use greenhouse_proto::{
    client, Command, DeviceKind, DeviceRegistration, DeviceStatus, Feature, FramedStream,
    RegistrationConfirmation, StatusSnapshot, WireMessage, DEVICE_NOT_FOUND, DEVICE_UNAVAILABLE,
    STATUS_UPDATED,
};
use greenhouse_sim::{DeviceSpec, SimConfig, SimHandle, Simulator};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

const DEADLINE: Duration = Duration::from_secs(2);

async fn start_gateway(config: GatewayConfig) -> (Gateway, GatewayHandle) {
    let gateway = Gateway::new(config).unwrap();
    let handle = gateway.start().await.unwrap();
    (gateway, handle)
}

/// Poll `check` until it returns true or a few seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Register `name` and wait for its confirmation.
async fn register(discovery: SocketAddr, name: &str, kind: DeviceKind, port: u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let reg = DeviceRegistration::new(name, kind, port);
    socket.send_to(&reg.encode().unwrap(), discovery).await.unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) = tokio::time::timeout(DEADLINE, socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let confirmation = RegistrationConfirmation::decode(&buf[..len]).unwrap();
    assert!(confirmation.confirms(name));
}

async fn start_sim(handle: &GatewayHandle, devices: Vec<DeviceSpec>) -> SimHandle {
    let config = SimConfig {
        discovery_address: Some(handle.discovery_addr()),
        status_port: handle.status_addr().port(),
        registration_timeout_ms: 300,
        report_interval_ms: 50,
        report_retry_ms: 20,
        tick_interval_ms: 50,
        seed: Some(1),
        devices,
        ..Default::default()
    };
    Simulator::new(config).unwrap().start().await.unwrap()
}

fn humidity_entry() -> DeviceStatus {
    DeviceStatus {
        name: "Humidity".into(),
        kind: DeviceKind::Sensor,
        feature: Feature::Humidity,
        actuator: None,
        on: false,
        human_state: "60.0 %".into(),
        value: 60.0,
        unit: "%".into(),
    }
}

#[tokio::test]
async fn test_registration_then_lookup() {
    let (gateway, handle) = start_gateway(GatewayConfig::ephemeral()).await;

    register(handle.discovery_addr(), "Heater", DeviceKind::Actuator, 6005).await;
    assert_eq!(
        gateway.registry().read().await.address_of("Heater"),
        Some("127.0.0.1:6005".parse().unwrap())
    );

    // Re-registration on another port replaces the address.
    register(handle.discovery_addr(), "Heater", DeviceKind::Actuator, 6105).await;
    assert_eq!(
        gateway.registry().read().await.address_of("heater"),
        Some("127.0.0.1:6105".parse().unwrap())
    );
    assert_eq!(gateway.device_count().await, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_malformed_datagram_does_not_stop_discovery() {
    let (gateway, handle) = start_gateway(GatewayConfig::ephemeral()).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"\xff\xfe not a registration", handle.discovery_addr())
        .await
        .unwrap();

    register(handle.discovery_addr(), "Light", DeviceKind::Sensor, 6004).await;
    assert!(gateway.registry().read().await.get("Light").is_some());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_get_humidity_from_cache() {
    let (_gateway, handle) = start_gateway(GatewayConfig::ephemeral()).await;

    client::push_snapshot(
        handle.status_addr(),
        &StatusSnapshot::with_statuses("", vec![humidity_entry()]),
        DEADLINE,
    )
    .await
    .unwrap();

    let client_addr = handle.client_addr();
    assert!(
        eventually(|| async move {
            client::send_command(client_addr, &Command::get_sensor(Feature::Humidity), DEADLINE)
                .await
                .map(|reply| reply.statuses == vec![humidity_entry()])
                .unwrap_or(false)
        })
        .await
    );

    let reply = client::send_command(client_addr, &Command::get_sensor(Feature::Light), DEADLINE)
        .await
        .unwrap();
    assert_eq!(reply.response_text, DEVICE_NOT_FOUND);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_device_keeps_client_connection() {
    let (_gateway, handle) = start_gateway(GatewayConfig {
        device_timeout_ms: 500,
        ..GatewayConfig::ephemeral()
    })
    .await;

    let closed_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    register(handle.discovery_addr(), "Cooler", DeviceKind::Actuator, closed_port).await;

    let mut conn = FramedStream::connect(handle.client_addr(), 64 * 1024, DEADLINE)
        .await
        .unwrap();

    conn.send_message(&Command::set_actuator(Feature::Temperature, "Cooler", 18.0))
        .await
        .unwrap();
    let reply: StatusSnapshot = conn.read_message().await.unwrap().unwrap();
    assert_eq!(reply.response_text, DEVICE_UNAVAILABLE);

    // Same connection, next command.
    conn.send_message(&Command::set_actuator(Feature::Light, "Lamps", 100.0))
        .await
        .unwrap();
    let reply: StatusSnapshot = conn.read_message().await.unwrap().unwrap();
    assert_eq!(reply.response_text, DEVICE_NOT_FOUND);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_set_heater_through_gateway() {
    let (gateway, handle) = start_gateway(GatewayConfig::ephemeral()).await;
    let sim = start_sim(
        &handle,
        vec![
            DeviceSpec::sensor("Temperature", Feature::Temperature, 0, 22.0, "°C"),
            DeviceSpec::actuator("Heater", Feature::Temperature, 0, "°C"),
        ],
    )
    .await;

    let heater = sim.endpoint("Heater").unwrap().clone();
    assert!(
        eventually(|| {
            let heater = heater.clone();
            async move { heater.is_registered() }
        })
        .await
    );
    assert_eq!(
        gateway.registry().read().await.address_of("Heater"),
        Some(heater.addr)
    );

    let reply = client::send_command(
        handle.client_addr(),
        &Command::set_actuator(Feature::Temperature, "Heater", 30.0),
        DEADLINE,
    )
    .await
    .unwrap();
    assert_eq!(reply.response_text, STATUS_UPDATED);
    assert!(reply.statuses[0].on);
    assert_eq!(reply.statuses[0].value, 30.0);

    // The reporter eventually brings the new state into the cache.
    let client_addr = handle.client_addr();
    assert!(
        eventually(|| async move {
            client::send_command(
                client_addr,
                &Command::get_actuator(Feature::Temperature, "heater"),
                DEADLINE,
            )
            .await
            .map(|reply| reply.statuses.first().map(|s| s.on).unwrap_or(false))
            .unwrap_or(false)
        })
        .await
    );

    sim.shutdown().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_full_greenhouse_reports_all_devices() {
    let (_gateway, handle) = start_gateway(GatewayConfig::ephemeral()).await;
    let devices = greenhouse_sim::config::default_devices()
        .into_iter()
        .map(|mut d| {
            d.port = 0;
            d
        })
        .collect();
    let sim = start_sim(&handle, devices).await;

    let client_addr = handle.client_addr();
    assert!(
        eventually(|| async move {
            let sensors = client::send_command(
                client_addr,
                &Command::get_all(DeviceKind::Sensor),
                DEADLINE,
            )
            .await;
            let actuators = client::send_command(
                client_addr,
                &Command::get_all(DeviceKind::Actuator),
                DEADLINE,
            )
            .await;
            matches!(
                (sensors, actuators),
                (Ok(s), Ok(a)) if s.statuses.len() == 3 && a.statuses.len() == 5
            )
        })
        .await
    );

    sim.shutdown().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_registrations_recorded_in_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("devices.db");
    let (_gateway, handle) = start_gateway(GatewayConfig {
        registry_db: Some(db.clone()),
        ..GatewayConfig::ephemeral()
    })
    .await;

    register(handle.discovery_addr(), "Irrigator", DeviceKind::Actuator, 6005).await;

    assert!(
        eventually(|| {
            let db = db.clone();
            async move {
                rusqlite::Connection::open(&db)
                    .and_then(|conn| {
                        conn.query_row(
                            "SELECT port FROM devices WHERE name = 'Irrigator'",
                            [],
                            |row| row.get::<_, u16>(0),
                        )
                    })
                    .map(|port| port == 6005)
                    .unwrap_or(false)
            }
        })
        .await
    );

    handle.shutdown().await;
}
