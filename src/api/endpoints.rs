//! Endpoint wrappers shipped with the SDK.
//!
//! Each wrapper runs inside [`ApiClient::with_reauth`], checks the domain
//! error codes it documents, and only then falls back to the status code.
//! Domain failures are never refreshed and retried.

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::client::{ApiClient, ApiResponse};
use crate::api::error::{
    ApiError, ConflictKind, CODE_CONFLICT, CODE_FORBIDDEN, CODE_INVALID_OLD_PASSWORD,
    CODE_NOT_FOUND, CODE_SAME_PASSWORD,
};
use crate::models::{NewPost, NotificationPage, Post};

const CANNOT_REPOST_OWN_POST_MESSAGE: &str = "Cannot repost your own post";

impl ApiClient {
    /// Invalidates the session behind the refresh cookie.
    pub async fn logout(&self) -> Result<Value, ApiError> {
        self.with_reauth(move |_| async move {
            self.send_with_cookie(Method::POST, "v1/auth/logout", None, None)
                .await?
                .error_for_status()?
                .decode()
        })
        .await
    }

    pub async fn change_password(&self, old: &str, new: &str) -> Result<Value, ApiError> {
        let params = json!({"newPassword": new, "oldPassword": old});
        let params = &params;
        self.with_reauth(move |_| async move {
            let token = self.current_token();
            let response = self
                .send_with_cookie(
                    Method::POST,
                    "v1/auth/change-password",
                    Some(params),
                    Some(&token),
                )
                .await?;
            match response.error_code() {
                Some(CODE_SAME_PASSWORD) => Err(ApiError::Conflict(ConflictKind::SamePassword)),
                Some(CODE_INVALID_OLD_PASSWORD) => {
                    Err(ApiError::Conflict(ConflictKind::InvalidOldPassword))
                }
                _ => response.error_for_status()?.decode(),
            }
        })
        .await
    }

    /// Creates a post, optionally on another user's wall.
    pub async fn create_post(
        &self,
        content: &str,
        wall_recipient_id: Option<Uuid>,
        attachment_ids: &[Uuid],
    ) -> Result<NewPost, ApiError> {
        let mut params = json!({ "content": content });
        if let Some(recipient) = wall_recipient_id {
            params["wallRecipientId"] = json!(recipient);
        }
        if !attachment_ids.is_empty() {
            params["attachmentIds"] = json!(attachment_ids);
        }
        let params = &params;

        self.with_reauth(move |_| async move {
            let response = self.send(Method::POST, "posts", Some(params)).await?;
            if response.error_code() == Some(CODE_NOT_FOUND) {
                return Err(ApiError::not_found("Wall recipient"));
            }
            reject_validation(&response)?;
            response.error_for_status()?.decode()
        })
        .await
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Post, ApiError> {
        let path = format!("posts/{id}");
        let path = path.as_str();
        self.with_reauth(move |_| async move {
            let response = self.send(Method::GET, path, None).await?;
            if response.error_code() == Some(CODE_NOT_FOUND) {
                return Err(ApiError::not_found("Post"));
            }
            response.error_for_status()?.decode_field("data")
        })
        .await
    }

    /// Replaces the post content and returns the stored content.
    pub async fn edit_post(&self, id: Uuid, content: &str) -> Result<String, ApiError> {
        let path = format!("posts/{id}");
        let path = path.as_str();
        let params = json!({ "content": content });
        let params = &params;
        self.with_reauth(move |_| async move {
            let response = self.send(Method::PUT, path, Some(params)).await?;
            match response.error_code() {
                Some(CODE_NOT_FOUND) => return Err(ApiError::not_found("Post")),
                Some(CODE_FORBIDDEN) => return Err(ApiError::forbidden("edit post")),
                _ => {}
            }
            reject_validation(&response)?;
            response.error_for_status()?.decode_field("content")
        })
        .await
    }

    pub async fn delete_post(&self, id: Uuid) -> Result<(), ApiError> {
        let path = format!("posts/{id}");
        let path = path.as_str();
        self.with_reauth(move |_| async move {
            let response = self.send(Method::DELETE, path, None).await?;
            if response.status() == StatusCode::NO_CONTENT {
                return Ok(());
            }
            match response.error_code() {
                Some(CODE_NOT_FOUND) => Err(ApiError::not_found("Post")),
                Some(CODE_FORBIDDEN) => Err(ApiError::forbidden("delete post")),
                _ => response.error_for_status().map(|_| ()),
            }
        })
        .await
    }

    /// Reposts a post with an optional comment.
    pub async fn repost(&self, id: Uuid, content: Option<&str>) -> Result<NewPost, ApiError> {
        let path = format!("posts/{id}/repost");
        let path = path.as_str();
        let params = match content {
            Some(content) => json!({ "content": content }),
            None => json!({}),
        };
        let params = &params;
        self.with_reauth(move |_| async move {
            let response = self.send(Method::POST, path, Some(params)).await?;
            match response.error_code() {
                Some(CODE_NOT_FOUND) => return Err(ApiError::not_found("Post")),
                Some(CODE_CONFLICT) => {
                    return Err(ApiError::Conflict(ConflictKind::AlreadyReposted))
                }
                _ => {}
            }
            let own_post = response.status() == StatusCode::UNPROCESSABLE_ENTITY
                && response
                    .json()
                    .and_then(|body| body.get("message"))
                    .and_then(Value::as_str)
                    == Some(CANNOT_REPOST_OWN_POST_MESSAGE);
            if own_post {
                return Err(ApiError::Conflict(ConflictKind::CannotRepostOwnPost));
            }
            reject_validation(&response)?;
            response.error_for_status()?.decode()
        })
        .await
    }

    pub async fn get_notifications(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<NotificationPage, ApiError> {
        let params = json!({ "limit": limit, "offset": offset });
        let params = &params;
        self.with_reauth(move |_| async move {
            self.execute(Method::GET, "notifications", Some(params))
                .await?
                .decode()
        })
        .await
    }

    /// Marks one notification as read. `false` means it already was.
    pub async fn mark_as_read(&self, id: Uuid) -> Result<bool, ApiError> {
        let path = format!("notifications/{id}/read");
        let path = path.as_str();
        self.with_reauth(move |_| async move {
            self.execute(Method::POST, path, None)
                .await?
                .decode_field("success")
        })
        .await
    }

    pub async fn mark_all_as_read(&self) -> Result<(), ApiError> {
        self.call(Method::POST, "notifications/read-all", None)
            .await
            .map(|_| ())
    }

    pub async fn get_unread_notifications_count(&self) -> Result<u64, ApiError> {
        self.call(Method::GET, "notifications/count", None)
            .await?
            .decode_field("count")
    }
}

fn reject_validation(response: &ApiResponse) -> Result<(), ApiError> {
    match response.validation_failure() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
