//! Notification stream modules.
//!
//! - `client`: opens the server-sent events request.
//! - `proto`: typed events decoded from stream frames.
//! - `session`: connection lifecycle, cancellable reads, and stop handles.
//! - `sse`: incremental `text/event-stream` framing.

/// Stream request and open-time error classification.
pub mod client;
/// Stream event payloads.
pub mod proto;
/// Session that owns one stream connection.
pub mod session;
/// Server-sent events framing over a byte stream.
pub mod sse;
