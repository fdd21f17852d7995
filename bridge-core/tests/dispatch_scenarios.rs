mod common;

use common::{
    await_command_completed, seed_device, start_control_plane, test_settings, test_settings_with,
};
use bridge_models::{
    domain::prelude::{CommandOutcome, SubmitOutcome},
    entities::prelude::Command,
    enums::common::{CommandStatus, DeviceStatus},
    CommandDispatch, ControlPlane, DeviceIngress,
};
use sea_orm::{EntityTrait, PaginatorTrait};
use std::{sync::atomic::Ordering, time::Duration};
use tokio::time::sleep;

fn accepted_id(outcome: SubmitOutcome) -> String {
    match outcome {
        SubmitOutcome::Accepted { command_id } => command_id,
        SubmitOutcome::QueueFull => panic!("unexpected queue-full outcome"),
    }
}

/// Two concurrent submissions of the same (device, key) pair resolve to one
/// durable command and the same id.
#[tokio::test]
async fn concurrent_submissions_deduplicate() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;

    let (a, b) = tokio::join!(
        plane.submit_command("d01", "K", "Reboot"),
        plane.submit_command("d01", "K", "Reboot"),
    );
    let id_a = accepted_id(a.unwrap());
    let id_b = accepted_id(b.unwrap());
    assert_eq!(id_a, id_b);

    let durable = Command::find().count(&conn).await.unwrap();
    assert_eq!(durable, 1);

    // A later resubmission still lands on the same command.
    let id_c = accepted_id(plane.submit_command("d01", "K", "Reboot").await.unwrap());
    assert_eq!(id_a, id_c);
}

/// Any mix of submissions leaves exactly one durable command per distinct
/// (device, key) pair.
#[tokio::test]
async fn durable_commands_equal_distinct_pairs() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;
    seed_device(&conn, "d02", DeviceStatus::Online, None).await;

    for round in 0..4 {
        for key in ["K1", "K2", "K3"] {
            let _ = plane
                .submit_command("d01", key, "Ping")
                .await
                .unwrap();
            if round % 2 == 0 {
                let _ = plane.submit_command("d02", key, "Ping").await.unwrap();
            }
        }
    }

    // 3 keys on d01 + the same 3 keys on d02.
    let durable = Command::find().count(&conn).await.unwrap();
    assert_eq!(durable, 6);
}

/// A device result completes the command with the device-provided payload
/// and a latency measured from creation; exactly one event fires.
#[tokio::test]
async fn device_result_completes_command() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;

    let mut frames = plane.register_device("conn-1", "d01").await.unwrap();
    let mut events = plane.broadcast_hub().subscribe();

    let responder = {
        let plane = plane.clone();
        tokio::spawn(async move {
            let frame = frames.recv().await.expect("expected a command frame");
            sleep(Duration::from_millis(120)).await;
            plane
                .ingest_command_result(
                    &frame.command_id,
                    CommandOutcome::Completed,
                    Some("OK".into()),
                )
                .await
                .unwrap();
        })
    };

    let id = accepted_id(plane.submit_command("d01", "K", "Reboot").await.unwrap());
    let snapshot = await_command_completed(&mut events, &id, Duration::from_secs(2)).await;
    responder.await.unwrap();

    assert_eq!(snapshot.status, CommandStatus::Completed);
    assert_eq!(snapshot.result.as_deref(), Some("OK"));
    let latency = snapshot.latency_ms.expect("latency must be set");
    assert!((100..1000).contains(&latency), "latency {latency} ms");

    let stored = Command::find_by_id(&id).one(&conn).await.unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Completed);
    assert_eq!(stored.result.as_deref(), Some("OK"));

    // No second command-completed event for this command: a duplicate
    // result is a no-op.
    plane
        .ingest_command_result(&id, CommandOutcome::Failed, Some("late".into()))
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    match events.try_recv() {
        Err(tokio::sync::broadcast::error::TryRecvError::Empty) => {}
        other => panic!("expected no further events, got {other:?}"),
    }
    let stored = Command::find_by_id(&id).one(&conn).await.unwrap().unwrap();
    assert_eq!(stored.result.as_deref(), Some("OK"));
}

/// A delivered command with no device result fails at the response timeout
/// with a "timeout" reason.
#[tokio::test]
async fn missing_result_times_out() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;

    // Register a connection that never answers, so the send succeeds and
    // the reconciler is armed.
    let _frames = plane.register_device("conn-1", "d01").await.unwrap();
    let mut events = plane.broadcast_hub().subscribe();

    let started = tokio::time::Instant::now();
    let id = accepted_id(plane.submit_command("d01", "K", "Reboot").await.unwrap());
    let snapshot = await_command_completed(&mut events, &id, Duration::from_secs(3)).await;

    assert_eq!(snapshot.status, CommandStatus::Failed);
    assert!(
        snapshot.result.as_deref().unwrap_or("").contains("timeout"),
        "result: {:?}",
        snapshot.result
    );
    // Fired by the reconciler, not the worker: roughly the response timeout.
    assert!(started.elapsed() >= Duration::from_millis(380));

    let stored = Command::find_by_id(&id).one(&conn).await.unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
}

/// With no live connection the dispatch burns its retries and the worker
/// fails the command synchronously.
#[tokio::test]
async fn unreachable_device_fails_after_retries() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Offline, None).await;

    let mut events = plane.broadcast_hub().subscribe();
    let id = accepted_id(plane.submit_command("d01", "K", "Reboot").await.unwrap());
    let snapshot = await_command_completed(&mut events, &id, Duration::from_secs(2)).await;

    assert_eq!(snapshot.status, CommandStatus::Failed);
    assert!(
        snapshot
            .result
            .as_deref()
            .unwrap_or("")
            .contains("transport send failed"),
        "result: {:?}",
        snapshot.result
    );

    let stored = Command::find_by_id(&id).one(&conn).await.unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
}

/// Submissions beyond the queue capacity are rejected with backpressure and
/// leave no durable row behind.
#[tokio::test]
async fn queue_overflow_rejects_without_persisting() {
    // Stall the worker on its first dequeue so the queue genuinely fills.
    let settings = test_settings_with(|inner| {
        inner.chaos.latency_min_ms = Some(5_000);
        inner.chaos.latency_max_ms = Some(5_000);
    });
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d01", DeviceStatus::Online, None).await;

    // The first command stalls in the worker and frees its queue slot.
    let first = plane.submit_command("d01", "K00", "Ping").await.unwrap();
    assert!(matches!(first, SubmitOutcome::Accepted { .. }));
    sleep(Duration::from_millis(50)).await;

    let mut accepted = 1u64;
    let mut rejected = 0u64;
    // 50 more fill the queue, the 52nd bounces.
    for i in 1..52 {
        match plane
            .submit_command("d01", &format!("K{i:02}"), "Ping")
            .await
            .unwrap()
        {
            SubmitOutcome::Accepted { .. } => accepted += 1,
            SubmitOutcome::QueueFull => rejected += 1,
        }
    }

    assert_eq!(accepted, 51);
    assert_eq!(rejected, 1);

    // Rejected submissions were never persisted.
    let durable = Command::find().count(&conn).await.unwrap();
    assert_eq!(durable, accepted);

    // The rejected key can be resubmitted once the queue drains; here it
    // simply becomes a fresh command.
    let metrics = plane.dispatch_metrics().snapshot();
    assert_eq!(metrics.queue_rejections, 1);
}

/// Five consecutive dispatch failures open the device's breaker; the next
/// command is not dispatched and dies by reconciliation instead.
#[tokio::test]
async fn breaker_opens_after_consecutive_failures() {
    let settings = test_settings();
    let (plane, conn) = start_control_plane(&settings).await;
    seed_device(&conn, "d02", DeviceStatus::Offline, None).await;

    let mut events = plane.broadcast_hub().subscribe();

    // No connection is ever registered for d02, so every dispatch fails.
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(accepted_id(
            plane
                .submit_command("d02", &format!("K{i}"), "Ping")
                .await
                .unwrap(),
        ));
    }
    for id in &ids {
        let snapshot = await_command_completed(&mut events, id, Duration::from_secs(3)).await;
        assert_eq!(snapshot.status, CommandStatus::Failed);
    }

    let dispatched_before = plane
        .dispatch_metrics()
        .commands_dispatched
        .load(Ordering::Relaxed);
    assert_eq!(dispatched_before, 5);

    // The sixth command is gated by the open breaker and fails by
    // reconciliation with a circuit-open reason.
    let id = accepted_id(plane.submit_command("d02", "K6", "Ping").await.unwrap());
    let snapshot = await_command_completed(&mut events, &id, Duration::from_secs(3)).await;
    assert_eq!(snapshot.status, CommandStatus::Failed);
    assert!(
        snapshot
            .result
            .as_deref()
            .unwrap_or("")
            .contains("circuit open"),
        "result: {:?}",
        snapshot.result
    );

    let dispatched_after = plane
        .dispatch_metrics()
        .commands_dispatched
        .load(Ordering::Relaxed);
    assert_eq!(dispatched_after, dispatched_before, "K6 must not dispatch");

    let stored = Command::find_by_id(&id).one(&conn).await.unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
}
