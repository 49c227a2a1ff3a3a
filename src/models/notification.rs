use serde::{Deserialize, Serialize};

use crate::realtime::events::event_type;

/// A stored notification. Delivery over the stream is best-effort; this
/// record is what the user sees when they come back online.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: String,
}

impl Notification {
    /// Payload pushed to the recipient's stream.
    pub fn stream_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "title": self.title,
            "message": self.message,
            "data": self.data,
            "created_at": self.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub data: Option<serde_json::Value>,
}

fn default_kind() -> String {
    event_type::NOTIFICATION.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<i64>,
}
