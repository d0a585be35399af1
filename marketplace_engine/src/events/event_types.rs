use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderStatusChanged,
    PaymentFailed,
    ReturnUpdated,
}

/// A message for one user. Delivery (push, email, chat) is somebody else's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: Value,
}

/// A best-effort UI push on a topic such as `order:42`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub topic: String,
    pub event: String,
    pub payload: Value,
}
