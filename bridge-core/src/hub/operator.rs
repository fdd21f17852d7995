//! Operator broadcast hub.
//!
//! One process-wide broadcast channel fans `OperatorEvent`s to every
//! connected operator session. Delivery is best-effort: a slow subscriber
//! lags and skips, it never blocks a publisher.

use bridge_models::{domain::prelude::OperatorEvent, BroadcastHub};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

pub struct OperatorHub {
    sender: broadcast::Sender<Arc<OperatorEvent>>,
}

impl OperatorHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of currently subscribed operator sessions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl BroadcastHub for OperatorHub {
    fn subscribe(&self) -> broadcast::Receiver<Arc<OperatorEvent>> {
        self.sender.subscribe()
    }

    fn publish(&self, event: OperatorEvent) {
        // Send errors only mean there is no active receiver.
        if self.sender.send(Arc::new(event)).is_err() {
            trace!("operator event dropped: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_models::enums::common::DeviceStatus;

    fn status_event(device_id: &str) -> OperatorEvent {
        OperatorEvent::DeviceStatusChanged {
            device_id: device_id.to_string(),
            status: DeviceStatus::Offline,
        }
    }

    #[tokio::test]
    async fn fans_out_to_all_subscribers() {
        let hub = OperatorHub::new(16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(status_event("d01"));

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            match event.as_ref() {
                OperatorEvent::DeviceStatusChanged { device_id, status } => {
                    assert_eq!(device_id, "d01");
                    assert_eq!(*status, DeviceStatus::Offline);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = OperatorHub::new(16);
        hub.publish(status_event("d01"));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let hub = OperatorHub::new(2);
        let mut rx = hub.subscribe();

        for i in 0..5 {
            hub.publish(status_event(&format!("d{i:02}")));
        }

        // The first recv reports the overrun, subsequent recvs resume with
        // the retained tail.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(rx.recv().await.is_ok());
    }
}
