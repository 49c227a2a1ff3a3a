use super::events::NotificationEvent;
use super::registry::{ConnectionRegistry, DeliveryOutcome};

/// Routes notifications to a user's open stream, if there is one.
///
/// Delivery is at-most-once and never fails from the caller's point of view:
/// a missing or dead stream just means the event is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Push `{"type": "notification", "data": notification}` to `user_id`.
    pub fn send(&self, user_id: &str, notification: serde_json::Value) -> DeliveryOutcome {
        self.send_event(user_id, &NotificationEvent::notification(notification))
    }

    pub fn send_event(&self, user_id: &str, event: &NotificationEvent) -> DeliveryOutcome {
        let outcome = self.registry.write(user_id, event.to_frame());
        match outcome {
            DeliveryOutcome::Delivered => {
                tracing::debug!(user_id, event_type = %event.event_type, "event delivered");
            }
            DeliveryOutcome::NotConnected => {
                tracing::debug!(user_id, event_type = %event.event_type, "no open stream, event dropped");
            }
            DeliveryOutcome::Stale => {
                tracing::debug!(user_id, event_type = %event.event_type, "stream closed, evicted and dropped");
            }
        }
        outcome
    }
}
