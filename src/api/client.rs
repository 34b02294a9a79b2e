use std::future::Future;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::credentials::{Credentials, TokenStore};
use crate::api::error::{classify_body, classify_refresh_body, error_code, ApiError};
use crate::retry::{retry_after_reauth, ReauthPolicy};
use crate::stream::client::{StreamClient, StreamError, NOTIFICATIONS_STREAM_PATH};

const ERROR_BODY_SNIPPET_LEN: usize = 220;
const REFRESH_PATH: &str = "v1/auth/refresh";
/// Literal body the auth endpoints return for a rejected bearer token.
const BARE_UNAUTHORIZED_BODY: &str = "UNAUTHORIZED";
pub const API_BASE_URL: &str = "https://xn--d1ah4a.com/api";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApiDefaults;

impl ApiDefaults {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
}

#[derive(Clone, Debug)]
pub struct ApiClientOptions {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            connect_timeout: ApiDefaults::CONNECT_TIMEOUT,
            request_timeout: ApiDefaults::REQUEST_TIMEOUT,
        }
    }
}

/// Authenticated client session.
///
/// Holds the shared transport, the token store, and the optional refresh
/// cookie. Cloning is cheap and clones share the token store.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: TokenStore,
    refresh_cookie: Option<SecretString>,
    reauth: ReauthPolicy,
    options: ApiClientOptions,
}

impl ApiClient {
    pub async fn new(credentials: Credentials) -> Result<Self, ApiError> {
        Self::with_options(credentials, ApiClientOptions::default()).await
    }

    /// Builds a client. With only a refresh cookie, one refresh runs before
    /// this returns, and its failure fails construction.
    pub async fn with_options(
        credentials: Credentials,
        options: ApiClientOptions,
    ) -> Result<Self, ApiError> {
        let Credentials {
            access_token,
            refresh_cookie,
        } = credentials.normalized()?;

        let http = Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(ApiError::Transport)?;
        let base_url = options.base_url.trim().trim_end_matches('/').to_string();

        let token = match access_token {
            Some(token) => token,
            None => {
                let cookie = refresh_cookie.as_ref().ok_or(ApiError::NoAuthData)?;
                debug!(event = "initial_token_refresh");
                request_access_token(&http, &base_url, options.request_timeout, cookie).await?
            }
        };

        Ok(Self {
            http,
            base_url,
            tokens: TokenStore::new(token),
            reauth: ReauthPolicy::for_refresh_credential(refresh_cookie.is_some()),
            refresh_cookie,
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the access token as of this call.
    pub fn current_token(&self) -> SecretString {
        self.tokens.current()
    }

    pub fn has_refresh_cookie(&self) -> bool {
        self.refresh_cookie.is_some()
    }

    /// Mints a new access token from the refresh cookie and stores it.
    ///
    /// Never retried: a failing refresh is returned as is.
    pub async fn refresh(&self) -> Result<SecretString, ApiError> {
        let cookie = self.refresh_cookie.as_ref().ok_or(ApiError::NoCookie)?;
        let token =
            request_access_token(&self.http, &self.base_url, self.options.request_timeout, cookie)
                .await
                .map_err(|error| {
                    warn!(event = "token_refresh_failed", error = %error);
                    error
                })?;
        self.tokens.replace(token.clone());
        info!(event = "token_refreshed");
        Ok(token)
    }

    /// Sends one authenticated request and recognizes the body-level error
    /// signals. Non-2xx responses without such a signal are returned so the
    /// caller can look for domain codes before calling
    /// [`ApiResponse::error_for_status`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        params: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.tokens.current();
        let mut builder = self
            .http
            .request(method.clone(), self.endpoint(path))
            .timeout(self.options.request_timeout)
            .bearer_auth(token.expose_secret());

        if let Some(params) = params {
            builder = if method == Method::GET {
                builder.query(params)
            } else {
                builder.json(params)
            };
        }

        let response = builder.send().await.map_err(ApiError::Transport)?;
        let response = ApiResponse::read(response).await?;

        if let Some(error) = response.json().and_then(classify_body) {
            debug!(event = "api_body_error", status = %response.status(), error = %error);
            return Err(error);
        }

        Ok(response)
    }

    /// [`send`](Self::send) followed by status-code handling.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        params: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.send(method, path, params).await?.error_for_status()
    }

    /// [`execute`](Self::execute) wrapped in the re-authentication retry.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.with_reauth(move |_| self.execute(method.clone(), path, params))
            .await
    }

    /// Runs `op`; on a stale-token, connection, or unclassified HTTP failure,
    /// and only when a refresh cookie is configured, refreshes once and runs
    /// `op` once more.
    pub async fn with_reauth<T, Op, Fut>(&self, op: Op) -> Result<T, ApiError>
    where
        Op: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        retry_after_reauth(self.reauth, op, ApiError::triggers_reauth, move || async move {
            self.refresh().await.map(|_| ())
        })
        .await
    }

    /// Sends a request authenticated by the refresh cookie.
    ///
    /// The bearer token is attached only when `bearer` is set.
    pub(crate) async fn send_with_cookie(
        &self,
        method: Method,
        path: &str,
        params: Option<&Value>,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse, ApiError> {
        let cookie = self.refresh_cookie.as_ref().ok_or(ApiError::NoCookie)?;
        send_cookie_request(
            &self.http,
            &self.endpoint(path),
            self.options.request_timeout,
            method,
            cookie,
            params,
            bearer,
        )
        .await
    }

    /// Stream client for the notification feed.
    ///
    /// The stream client owns a separate transport, so stream connections are
    /// never pooled with REST traffic. It shares this client's token store.
    pub fn notification_stream(&self) -> Result<StreamClient, StreamError> {
        StreamClient::new(
            self.endpoint(NOTIFICATIONS_STREAM_PATH),
            self.tokens.clone(),
            self.options.connect_timeout,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("reauth", &self.reauth)
            .finish_non_exhaustive()
    }
}

/// A fully read response whose body carried no auth or rate-limit signal.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
    json: Option<Value>,
}

impl ApiResponse {
    async fn read(response: Response) -> Result<Self, ApiError> {
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;
        Ok(Self::from_parts(status, body))
    }

    pub(crate) fn from_parts(status: StatusCode, body: String) -> Self {
        // Absent or non-JSON bodies (204, plain text) fall back to
        // status-only handling.
        let json = serde_json::from_str(&body).ok();
        Self { status, body, json }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Structured `error.code`, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.json.as_ref().and_then(error_code)
    }

    /// First entry of the `found` map on a 422 response.
    pub fn validation_failure(&self) -> Option<ApiError> {
        if self.status != StatusCode::UNPROCESSABLE_ENTITY {
            return None;
        }
        let (field, value) = self.json.as_ref()?.get("found")?.as_object()?.iter().next()?;
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Some(ApiError::Validation {
            field: field.clone(),
            value,
        })
    }

    /// Converts a non-2xx response into [`ApiError::HttpStatus`], logging the
    /// raw body.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let body = summarize_body(&self.body);
        warn!(
            event = "api_unclassified_error",
            status = %self.status,
            body = %body
        );
        Err(ApiError::HttpStatus {
            status: self.status,
            code: self.error_code().map(str::to_string),
            body,
        })
    }

    /// Decodes the whole body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|source| ApiError::Decode {
            source,
            body: summarize_body(&self.body),
        })
    }

    /// Decodes one top-level field of the body.
    pub fn decode_field<T: DeserializeOwned>(&self, field: &str) -> Result<T, ApiError> {
        let value = self
            .json
            .as_ref()
            .and_then(|json| json.get(field))
            .cloned()
            .unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|source| ApiError::Decode {
            source,
            body: summarize_body(&self.body),
        })
    }
}

async fn request_access_token(
    http: &Client,
    base_url: &str,
    timeout: Duration,
    cookie: &SecretString,
) -> Result<SecretString, ApiError> {
    let response = send_cookie_request(
        http,
        &join_url(base_url, REFRESH_PATH),
        timeout,
        Method::POST,
        cookie,
        None,
        None,
    )
    .await?
    .error_for_status()?;

    let token: String = response.decode_field("accessToken")?;
    Ok(SecretString::new(token))
}

async fn send_cookie_request(
    http: &Client,
    endpoint: &str,
    timeout: Duration,
    method: Method,
    cookie: &SecretString,
    params: Option<&Value>,
    bearer: Option<&SecretString>,
) -> Result<ApiResponse, ApiError> {
    let mut builder = http
        .request(method, endpoint)
        .timeout(timeout)
        .header(COOKIE, cookie.expose_secret())
        .header(CONTENT_TYPE, "application/json");

    if let Some(token) = bearer {
        builder = builder.bearer_auth(token.expose_secret());
    }
    if let Some(params) = params {
        builder = builder.json(params);
    }

    let response = builder.send().await.map_err(ApiError::Transport)?;
    let response = ApiResponse::read(response).await?;

    if response.body().trim() == BARE_UNAUTHORIZED_BODY {
        return Err(ApiError::InvalidToken);
    }
    if let Some(error) = response.json().and_then(classify_refresh_body) {
        return Err(error);
    }

    Ok(response)
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url, path.trim_start_matches('/'))
}

pub(crate) fn summarize_body(body: &str) -> String {
    body.chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}
