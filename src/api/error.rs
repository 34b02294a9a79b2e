//! Error taxonomy and in-body error classification.
//!
//! The API reports several conditions inside the JSON body, sometimes with a
//! status line that disagrees. Body signals are therefore checked before the
//! HTTP status.

use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_FORBIDDEN: &str = "FORBIDDEN";
pub const CODE_CONFLICT: &str = "CONFLICT";
pub const CODE_SAME_PASSWORD: &str = "SAME_PASSWORD";
pub const CODE_INVALID_OLD_PASSWORD: &str = "INVALID_OLD_PASSWORD";
/// Bare string form of the rate-limit error used by older gateway responses.
pub const LEGACY_RATE_LIMIT_ERROR: &str = "Too Many Requests";

/// Reason a refresh cookie was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionErrorCode {
    /// Refresh token does not match any session.
    SessionNotFound,
    /// Cookie carried no refresh token.
    RefreshTokenMissing,
    /// Session lifetime elapsed.
    SessionExpired,
    /// Session was revoked (logged out).
    SessionRevoked,
}

impl SessionErrorCode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SESSION_NOT_FOUND" => Some(Self::SessionNotFound),
            "REFRESH_TOKEN_MISSING" => Some(Self::RefreshTokenMissing),
            "SESSION_EXPIRED" => Some(Self::SessionExpired),
            "SESSION_REVOKED" => Some(Self::SessionRevoked),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionRevoked => "SESSION_REVOKED",
        }
    }
}

impl fmt::Display for SessionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = match self {
            Self::SessionNotFound => "session not found (incorrect refresh token)",
            Self::RefreshTokenMissing => "no refresh token",
            Self::SessionExpired => "session expired",
            Self::SessionRevoked => "session revoked (logged out)",
        };
        f.write_str(detail)
    }
}

/// Domain rejections that are not about authentication.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConflictKind {
    SamePassword,
    InvalidOldPassword,
    AlreadyReposted,
    CannotRepostOwnPost,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = match self {
            Self::SamePassword => "old and new password must differ",
            Self::InvalidOldPassword => "old password is incorrect",
            Self::AlreadyReposted => "post already reposted",
            Self::CannotRepostOwnPost => "cannot repost your own post",
        };
        f.write_str(detail)
    }
}

/// Every failure a REST or auth operation can report.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no auth data: provide an access token or a refresh cookie")]
    NoAuthData,

    #[error("refresh cookie required for this action")]
    NoCookie,

    #[error("invalid cookie data: {code}")]
    InvalidCookie { code: SessionErrorCode },

    #[error("invalid access token")]
    InvalidToken,

    #[error("unauthorized: access token rejected")]
    Unauthorized,

    #[error("rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("failed validation on {field}: \"{value}\"")]
    Validation { field: String, value: String },

    #[error("forbidden to {action}")]
    Forbidden { action: String },

    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    #[error("http status {status}: {body}")]
    HttpStatus {
        status: StatusCode,
        code: Option<String>,
        body: String,
    },

    #[error("failed to decode response: {source}. body={body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl ApiError {
    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub(crate) fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    /// Whether a refresh could plausibly fix this failure.
    ///
    /// Stale tokens, connection failures, and unclassified HTTP errors qualify.
    /// Rate limits, domain rejections, and refresh failures never do.
    pub fn triggers_reauth(&self) -> bool {
        match self {
            Self::Unauthorized | Self::HttpStatus { .. } => true,
            Self::Transport(err) => err.is_connect(),
            Self::NoAuthData
            | Self::NoCookie
            | Self::InvalidCookie { .. }
            | Self::InvalidToken
            | Self::RateLimited { .. }
            | Self::NotFound { .. }
            | Self::Validation { .. }
            | Self::Forbidden { .. }
            | Self::Conflict(_)
            | Self::Decode { .. } => false,
        }
    }
}

/// Returns `error.code` when the body carries the structured error shape.
pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error")?.get("code")?.as_str()
}

/// Recognizes either rate-limit shape.
pub(crate) fn rate_limit(body: &Value) -> Option<ApiError> {
    let error = body.get("error")?;
    if error.as_str() == Some(LEGACY_RATE_LIMIT_ERROR) {
        return Some(ApiError::RateLimited { retry_after: 0 });
    }
    if error.get("code")?.as_str()? != CODE_RATE_LIMIT_EXCEEDED {
        return None;
    }
    Some(ApiError::RateLimited {
        retry_after: retry_after_secs(error.get("retryAfter")),
    })
}

/// Classifies the body signals every authenticated request honors, in order:
/// legacy rate limit, structured rate limit, stale token.
pub(crate) fn classify_body(body: &Value) -> Option<ApiError> {
    if let Some(rate_limited) = rate_limit(body) {
        return Some(rate_limited);
    }
    match error_code(body)? {
        CODE_UNAUTHORIZED => Some(ApiError::Unauthorized),
        _ => None,
    }
}

/// Like [`classify_body`] but also maps the refresh-session codes.
pub(crate) fn classify_refresh_body(body: &Value) -> Option<ApiError> {
    if let Some(rate_limited) = rate_limit(body) {
        return Some(rate_limited);
    }
    if let Some(code) = error_code(body).and_then(SessionErrorCode::from_code) {
        return Some(ApiError::InvalidCookie { code });
    }
    classify_body(body)
}

fn retry_after_secs(value: Option<&Value>) -> u64 {
    let Some(value) = value else {
        return 0;
    };
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(|secs| secs.ceil() as u64)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::{classify_body, classify_refresh_body, ApiError, SessionErrorCode};
    use crate::retry::{retry_after_reauth, ReauthPolicy};

    #[test]
    fn legacy_rate_limit_has_zero_retry_after() {
        let body = json!({"error": "Too Many Requests"});
        assert!(matches!(
            classify_body(&body),
            Some(ApiError::RateLimited { retry_after: 0 })
        ));
    }

    #[test]
    fn structured_rate_limit_carries_retry_after() {
        let body = json!({"error": {"code": "RATE_LIMIT_EXCEEDED", "retryAfter": 45}});
        assert!(matches!(
            classify_body(&body),
            Some(ApiError::RateLimited { retry_after: 45 })
        ));

        let body = json!({"error": {"code": "RATE_LIMIT_EXCEEDED"}});
        assert!(matches!(
            classify_body(&body),
            Some(ApiError::RateLimited { retry_after: 0 })
        ));
    }

    #[test]
    fn unauthorized_code_is_recognized() {
        let body = json!({"error": {"code": "UNAUTHORIZED", "message": "token expired"}});
        assert!(matches!(classify_body(&body), Some(ApiError::Unauthorized)));
    }

    #[test]
    fn other_bodies_are_left_to_the_caller() {
        assert!(classify_body(&json!({"error": {"code": "NOT_FOUND"}})).is_none());
        assert!(classify_body(&json!({"error": "Bad Request"})).is_none());
        assert!(classify_body(&json!({"data": {"id": 1}})).is_none());
        assert!(classify_body(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn refresh_codes_map_to_invalid_cookie() {
        for (code, expected) in [
            ("SESSION_NOT_FOUND", SessionErrorCode::SessionNotFound),
            ("REFRESH_TOKEN_MISSING", SessionErrorCode::RefreshTokenMissing),
            ("SESSION_EXPIRED", SessionErrorCode::SessionExpired),
            ("SESSION_REVOKED", SessionErrorCode::SessionRevoked),
        ] {
            let body = json!({"error": {"code": code}});
            match classify_refresh_body(&body) {
                Some(ApiError::InvalidCookie { code }) => assert_eq!(code, expected),
                other => panic!("unexpected classification for {code}: {other:?}"),
            }
            assert_eq!(expected.as_str(), code);
        }
    }

    #[test]
    fn reauth_set_excludes_domain_and_rate_limit_errors() {
        assert!(ApiError::Unauthorized.triggers_reauth());
        assert!(ApiError::HttpStatus {
            status: reqwest::StatusCode::BAD_GATEWAY,
            code: None,
            body: String::new(),
        }
        .triggers_reauth());

        assert!(!ApiError::RateLimited { retry_after: 3 }.triggers_reauth());
        assert!(!ApiError::not_found("Post").triggers_reauth());
        assert!(!ApiError::forbidden("delete post").triggers_reauth());
        assert!(!ApiError::NoCookie.triggers_reauth());
        assert!(!ApiError::InvalidCookie {
            code: SessionErrorCode::SessionRevoked
        }
        .triggers_reauth());
    }

    #[tokio::test]
    async fn refused_connection_is_refreshed_once_then_replayed() {
        let refreshes = AtomicUsize::new(0);
        let result = retry_after_reauth(
            ReauthPolicy::RefreshOnce,
            |attempt| async move {
                if attempt == 1 {
                    let err = reqwest::Client::new()
                        .get("http://127.0.0.1:9/api/posts")
                        .send()
                        .await
                        .expect_err("nothing listens on port 9");
                    return Err(ApiError::Transport(err));
                }
                Ok(attempt)
            },
            ApiError::triggers_reauth,
            || async {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert_eq!(result.expect("replay succeeds"), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }
}
