use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    WallPost,
    Reply,
    Repost,
    Comment,
    Follow,
    Like,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTargetType {
    Post,
}

/// Short profile of the user who triggered a notification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActorSummary {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<NotificationTargetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub actor: ActorSummary,
    #[serde(default)]
    pub read: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub has_more: bool,
}

/// Post as returned by create and repost calls.
///
/// Only the identifying fields are typed; the rest is kept verbatim.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub reposts_count: u64,
    #[serde(default)]
    pub views_count: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Notification, NotificationType, Post};

    #[test]
    fn notification_decodes_wire_field_names() {
        let value = json!({
            "id": "0b8f9c3e-6a43-4c3c-9a7a-2f5b0f6f1a11",
            "type": "wall_post",
            "targetType": "post",
            "targetId": "5a1d2f34-9e1b-4d7a-8c55-0e2a6b7c8d90",
            "preview": "hello",
            "readAt": null,
            "createdAt": "2026-01-02T03:04:05Z",
            "actor": {
                "id": "7d3c1b2a-1111-4222-8333-944455556666",
                "username": "alice",
                "displayName": "Alice"
            }
        });

        let notification: Notification = serde_json::from_value(value).expect("decode");
        assert_eq!(notification.kind, NotificationType::WallPost);
        assert_eq!(notification.actor.display_name, "Alice");
        assert!(notification.read_at.is_none());
        assert!(!notification.read);
    }

    #[test]
    fn post_keeps_untyped_fields() {
        let value = json!({
            "id": "0b8f9c3e-6a43-4c3c-9a7a-2f5b0f6f1a11",
            "content": "hi",
            "likesCount": 3,
            "isOwner": true
        });

        let post: Post = serde_json::from_value(value).expect("decode");
        assert_eq!(post.likes_count, 3);
        assert_eq!(post.extra.get("isOwner"), Some(&json!(true)));
    }
}
