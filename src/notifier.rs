//! Change-feed contract for live multi-writer views.
//!
//! Department screens showing the same appointment subscribe per hospital and
//! receive `{appointment_id, changed_fields, new_values}` after every
//! committed write. Delivery semantics belong to the deployment's transport;
//! this crate only defines the published contract plus an in-process
//! implementation used by tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub appointment_id: Uuid,
    pub hospital_id: Uuid,
    pub changed_fields: Vec<&'static str>,
    pub new_values: serde_json::Value,
}

pub trait ChangeNotifier: Send + Sync {
    fn publish(&self, event: ChangeEvent);
}

/// Drop-in for callers that do not consume the feed.
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn publish(&self, _event: ChangeEvent) {}
}

const CHANNEL_CAPACITY: usize = 256;

/// In-process pub/sub keyed by hospital scope. Dropping a receiver is the
/// unsubscribe; senders with no remaining receivers are pruned on the next
/// publish so disconnected hospitals do not accumulate channels.
#[derive(Default)]
pub struct InProcessNotifier {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<ChangeEvent>>>,
}

impl InProcessNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, hospital_id: Uuid) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.lock().expect("notifier lock poisoned");
        channels
            .entry(hospital_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

impl ChangeNotifier for InProcessNotifier {
    fn publish(&self, event: ChangeEvent) {
        let mut channels = self.channels.lock().expect("notifier lock poisoned");
        if let Some(sender) = channels.get(&event.hospital_id) {
            if sender.receiver_count() == 0 {
                channels.remove(&event.hospital_id);
            } else {
                // Lagging receivers miss events; that is the broadcast
                // contract and acceptable for a UI refresh feed.
                let _ = sender.send(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(hospital_id: Uuid) -> ChangeEvent {
        ChangeEvent {
            appointment_id: Uuid::new_v4(),
            hospital_id,
            changed_fields: vec!["confirmation"],
            new_values: serde_json::json!({ "confirmation": "confirmed" }),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_for_its_hospital_only() {
        let notifier = InProcessNotifier::new();
        let hospital_a = Uuid::new_v4();
        let hospital_b = Uuid::new_v4();
        let mut rx_a = notifier.subscribe(hospital_a);
        let mut rx_b = notifier.subscribe(hospital_b);

        notifier.publish(event(hospital_a));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.hospital_id, hospital_a);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_channel_is_pruned() {
        let notifier = InProcessNotifier::new();
        let hospital = Uuid::new_v4();
        let rx = notifier.subscribe(hospital);
        drop(rx);

        // First publish after the drop prunes the channel.
        notifier.publish(event(hospital));
        assert!(notifier.channels.lock().unwrap().is_empty());

        // Re-subscribing after pruning works.
        let mut rx = notifier.subscribe(hospital);
        notifier.publish(event(hospital));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let notifier = InProcessNotifier::new();
        notifier.publish(event(Uuid::new_v4()));
    }
}
