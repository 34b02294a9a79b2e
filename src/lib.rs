//! User-facing Rust SDK for the ITD social platform API.
//!
//! The crate is organized by transport surface:
//! - `api`: authenticated REST session with token refresh and error
//!   classification.
//! - `stream`: server-sent notification stream with external stop control.
//! - `retry`: the bounded single re-authentication retry shared by REST calls.
//! - `models`: payload types shared by REST and stream surfaces.

/// Authenticated REST client, credentials, and error taxonomy.
pub mod api;
/// Payload types shared across surfaces.
pub mod models;
/// Re-authentication retry helper.
pub mod retry;
/// Notification stream client, protocol types, and session state machine.
pub mod stream;

pub use api::client::{ApiClient, ApiClientOptions};
pub use api::credentials::Credentials;
pub use api::error::ApiError;
pub use stream::client::{StreamClient, StreamError};
pub use stream::proto::StreamEvent;
pub use stream::session::{StopHandle, StreamSession, StreamState};
