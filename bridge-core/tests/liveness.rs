mod common;

use common::{seed_device, start_control_plane, test_settings};
use bridge_models::{
    domain::prelude::OperatorEvent,
    entities::prelude::Device,
    enums::common::DeviceStatus,
    ControlPlane, DeviceIngress,
};
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::EntityTrait;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// A device last seen beyond the threshold flips offline exactly once; a
/// recently seen device flips back online.
#[tokio::test]
async fn sweep_transitions_devices_once() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;

    // d03 went quiet 35 s ago; d04 reported 5 s ago but is marked offline.
    seed_device(
        &conn,
        "d03",
        DeviceStatus::Online,
        Some(Utc::now() - ChronoDuration::seconds(35)),
    )
    .await;
    seed_device(
        &conn,
        "d04",
        DeviceStatus::Offline,
        Some(Utc::now() - ChronoDuration::seconds(5)),
    )
    .await;
    // d05 has never been seen and must be left alone.
    seed_device(&conn, "d05", DeviceStatus::Offline, None).await;

    let mut events = plane.broadcast_hub().subscribe();

    let mut offline_events = 0;
    let mut online_events = 0;
    // The sweep period is 100 ms in test settings; two sweeps fit easily.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while let Ok(Ok(event)) = timeout(
        deadline.saturating_duration_since(tokio::time::Instant::now()),
        events.recv(),
    )
    .await
    {
        if let OperatorEvent::DeviceStatusChanged { device_id, status } = event.as_ref() {
            match (device_id.as_str(), status) {
                ("d03", DeviceStatus::Offline) => offline_events += 1,
                ("d04", DeviceStatus::Online) => online_events += 1,
                other => panic!("unexpected transition: {other:?}"),
            }
        }
    }

    // One transition per device, even though several sweeps ran.
    assert_eq!(offline_events, 1);
    assert_eq!(online_events, 1);

    let d03 = Device::find_by_id("d03").one(&conn).await.unwrap().unwrap();
    assert_eq!(d03.status, DeviceStatus::Offline);
    let d04 = Device::find_by_id("d04").one(&conn).await.unwrap().unwrap();
    assert_eq!(d04.status, DeviceStatus::Online);
    let d05 = Device::find_by_id("d05").one(&conn).await.unwrap().unwrap();
    assert_eq!(d05.status, DeviceStatus::Offline);
}

/// Registering a device connection refreshes last-seen, which the next
/// sweep turns into an online transition.
#[tokio::test]
async fn inbound_registration_revives_device() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(
        &conn,
        "d06",
        DeviceStatus::Offline,
        Some(Utc::now() - ChronoDuration::seconds(120)),
    )
    .await;

    let _frames = plane.register_device("conn-1", "d06").await.unwrap();
    sleep(Duration::from_millis(250)).await;

    let d06 = Device::find_by_id("d06").one(&conn).await.unwrap().unwrap();
    assert_eq!(d06.status, DeviceStatus::Online);
    assert!(d06.last_seen.is_some());
}
