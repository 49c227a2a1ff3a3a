use serde::{Deserialize, Serialize};

/// Event types carried on the notification stream.
pub mod event_type {
    pub const NOTIFICATION: &str = "notification";
    pub const APPOINTMENT_UPDATE: &str = "appointment_update";
    pub const CONNECTED: &str = "connected";
}

/// Listener key that receives every event regardless of type.
pub const WILDCARD: &str = "*";

/// Envelope written to a delivery channel: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NotificationEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn notification(data: serde_json::Value) -> Self {
        Self::new(event_type::NOTIFICATION, data)
    }

    /// Serialize to the single-line JSON form used as an SSE `data:` field.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
