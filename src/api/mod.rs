//! REST session modules.
//!
//! - `credentials`: construction inputs and the shared access-token store.
//! - `error`: error taxonomy and in-body error code classification.
//! - `client`: request executor, auth refresher, and retry-wrapped calls.
//! - `endpoints`: typed wrappers for the endpoints the SDK ships with.

/// Credentials and token store.
pub mod credentials;
/// Endpoint wrappers built on the executor.
pub mod endpoints;
/// Error types and response body classification.
pub mod error;
/// HTTP client with token lifecycle management.
pub mod client;
