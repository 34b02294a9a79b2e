use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::models::Notification;
use crate::stream::sse::SseFrame;

pub const CONNECTED_EVENT: &str = "connected";
pub const NOTIFICATION_EVENT: &str = "notification";
/// Event name implied by frames that carry no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectMsg {
    #[serde(rename = "userId")]
    pub subscriber_id: Uuid,
    /// Server clock at connect, in milliseconds since the epoch.
    #[serde(rename = "timestamp")]
    pub server_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationMsg {
    #[serde(flatten)]
    pub notification: Notification,
    #[serde(rename = "userId")]
    pub subscriber_id: Uuid,
    #[serde(default = "default_sound")]
    pub sound: bool,
}

fn default_sound() -> bool {
    true
}

/// Typed event yielded by a [`StreamSession`](crate::stream::session::StreamSession).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Sent once when the stream opens.
    Connect(ConnectMsg),
    Notification(NotificationMsg),
}

impl StreamEvent {
    /// Decodes a frame.
    ///
    /// `Ok(None)` means the frame carries nothing to deliver: keep-alives with
    /// empty data, or event names this client does not handle. A frame whose
    /// JSON is malformed or does not fit the expected shape is an `Err`.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        if frame.data.trim().is_empty() {
            return Ok(None);
        }

        match frame.event.as_deref().unwrap_or(DEFAULT_EVENT) {
            CONNECTED_EVENT => serde_json::from_str(&frame.data).map(|msg| Some(Self::Connect(msg))),
            NOTIFICATION_EVENT => {
                serde_json::from_str(&frame.data).map(|msg| Some(Self::Notification(msg)))
            }
            DEFAULT_EVENT => Self::from_untagged(&frame.data).map(Some),
            other => {
                debug!(event = "stream_frame_ignored", sse_event = other);
                Ok(None)
            }
        }
    }

    /// Without an event name, only notifications carry a `type` field.
    fn from_untagged(data: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(data)?;
        if value.get("type").is_some() {
            serde_json::from_value(value).map(Self::Notification)
        } else {
            serde_json::from_value(value).map(Self::Connect)
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}
