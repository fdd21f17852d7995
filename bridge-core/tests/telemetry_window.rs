mod common;

use common::{seed_device, start_control_plane, test_settings_with};
use bridge_models::{
    domain::prelude::OperatorEvent, enums::common::DeviceStatus, ControlPlane, DeviceIngress,
};
use sea_orm::DatabaseConnection;

async fn recent_payloads(conn: &DatabaseConnection, device_id: &str) -> Vec<String> {
    use bridge_models::entities::prelude::{Telemetry, TelemetryColumn};
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

    Telemetry::find()
        .filter(TelemetryColumn::DeviceId.eq(device_id))
        .order_by_desc(TelemetryColumn::Ts)
        .order_by_desc(TelemetryColumn::Id)
        .all(conn)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.payload)
        .collect()
}

/// The rolling window keeps at most N samples per device and always retains
/// the newest.
#[tokio::test]
async fn window_prunes_to_newest_samples() {
    let settings = test_settings_with(|inner| inner.telemetry.window = 10);
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;
    seed_device(&conn, "d02", DeviceStatus::Online, None).await;

    for i in 0..25 {
        plane
            .ingest_telemetry("d01", &format!("temp={i}"))
            .await
            .unwrap();
    }
    // A second device must not be affected by d01's pruning.
    for i in 0..3 {
        plane
            .ingest_telemetry("d02", &format!("hum={i}"))
            .await
            .unwrap();
    }

    let d01 = recent_payloads(&conn, "d01").await;
    assert_eq!(d01.len(), 10);
    assert_eq!(d01.first().map(String::as_str), Some("temp=24"));
    assert!(!d01.contains(&"temp=14".to_string()));

    let d02 = recent_payloads(&conn, "d02").await;
    assert_eq!(d02.len(), 3);
}

/// Every ingested sample reaches operator subscribers.
#[tokio::test]
async fn telemetry_events_reach_operators() {
    let settings = test_settings_with(|inner| inner.telemetry.window = 10);
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;

    let mut events = plane.broadcast_hub().subscribe();
    plane.ingest_telemetry("d01", "temp=21.5").await.unwrap();

    let event = events.recv().await.unwrap();
    match event.as_ref() {
        OperatorEvent::TelemetryReceived { sample } => {
            assert_eq!(sample.device_id, "d01");
            assert_eq!(sample.payload, "temp=21.5");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

/// Telemetry from an unknown device is dropped, not persisted.
#[tokio::test]
async fn unknown_device_telemetry_is_dropped() {
    let settings = test_settings_with(|inner| inner.telemetry.window = 10);
    let (plane, conn) = start_control_plane(&settings).await;

    plane.ingest_telemetry("ghost", "noise").await.unwrap();
    assert!(recent_payloads(&conn, "ghost").await.is_empty());
}
