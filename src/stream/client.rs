//! Notification stream client.
//!
//! The client only knows how to open the `text/event-stream` request; the
//! returned [`StreamSession`] owns the connection from then on. Stream
//! traffic uses its own transport without a read timeout, since the server
//! may stay silent between keep-alives for as long as it likes.

use std::time::Duration;

use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::client::summarize_body;
use crate::api::credentials::TokenStore;
use crate::api::error::{classify_body, ApiError};
use crate::stream::session::StreamSession;

/// Notification feed path, relative to the API base URL.
pub const NOTIFICATIONS_STREAM_PATH: &str = "notifications/stream";
const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Opens notification stream sessions.
///
/// Usually obtained from [`ApiClient::notification_stream`](crate::ApiClient::notification_stream).
#[derive(Clone, Debug)]
pub struct StreamClient {
    http: Client,
    endpoint: String,
    tokens: TokenStore,
}

impl StreamClient {
    /// Builds a stream client for `endpoint` that authenticates with whatever
    /// token `tokens` holds when a session opens.
    pub fn new(
        endpoint: impl Into<String>,
        tokens: TokenStore,
        connect_timeout: Duration,
    ) -> Result<Self, StreamError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(StreamError::Transport)?;
        let endpoint = endpoint.into();
        Ok(Self {
            http,
            endpoint: endpoint.trim_end().to_string(),
            tokens,
        })
    }

    /// Sets an explicit stream endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = endpoint.trim_end().to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns a session in the connecting state.
    ///
    /// No request is sent until the first [`StreamSession::recv`], so a
    /// session can be stopped before it ever touches the network.
    pub fn open(&self) -> StreamSession {
        StreamSession::new(self.clone())
    }

    /// Sends the stream request and returns the response once its head
    /// arrives with a success status.
    pub(crate) async fn connect(&self) -> Result<reqwest::Response, StreamError> {
        let token = self.tokens.current();
        debug!(event = "stream_connect_started", endpoint = %self.endpoint);

        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(StreamError::Transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.map_err(StreamError::Transport)?;
        let error = classify_open_failure(status, &body);
        warn!(
            event = "stream_connect_rejected",
            status = %status,
            error = %error
        );
        Err(error)
    }
}

/// Failures reported while opening or reading a notification stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream transport error: {0}")]
    Transport(reqwest::Error),

    /// The server rejected the access token. Refresh and reopen.
    #[error("stream unauthorized: access token rejected")]
    Unauthorized,

    #[error("stream rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("stream open failed with http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    /// The server closed the stream.
    #[error("stream closed by server")]
    Disconnected,
}

fn classify_open_failure(status: StatusCode, body: &str) -> StreamError {
    let classified = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(classify_body);
    match classified {
        Some(ApiError::Unauthorized) => StreamError::Unauthorized,
        Some(ApiError::RateLimited { retry_after }) => StreamError::RateLimited { retry_after },
        _ if status == StatusCode::UNAUTHORIZED => StreamError::Unauthorized,
        _ => StreamError::HttpStatus {
            status,
            body: summarize_body(body),
        },
    }
}
