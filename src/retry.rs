//! Bounded re-authentication retry.
//!
//! The helper is transport-agnostic: it wraps any unit of work, and on a
//! qualifying failure runs a recovery step once and replays the work once.
//! There is no backoff and no second replay.

use std::future::Future;

use tracing::debug;

/// Whether failed calls may be recovered by refreshing credentials.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReauthPolicy {
    /// Failures propagate immediately.
    #[default]
    Disabled,
    /// One refresh followed by one replay.
    RefreshOnce,
}

impl ReauthPolicy {
    /// Chooses the policy from whether a refresh credential is configured.
    pub fn for_refresh_credential(configured: bool) -> Self {
        if configured {
            Self::RefreshOnce
        } else {
            Self::Disabled
        }
    }
}

/// Runs `op`, and on a failure accepted by `should_reauth` runs `reauth` then
/// `op` one more time.
///
/// `op` receives the 1-based attempt number. The replay's result is returned
/// as is, success or failure. A failing `reauth` is returned without a replay.
pub async fn retry_after_reauth<T, E, Op, Fut, ShouldReauth, Reauth, ReauthFut>(
    policy: ReauthPolicy,
    mut op: Op,
    should_reauth: ShouldReauth,
    reauth: Reauth,
) -> Result<T, E>
where
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldReauth: FnOnce(&E) -> bool,
    Reauth: FnOnce() -> ReauthFut,
    ReauthFut: Future<Output = Result<(), E>>,
{
    let error = match op(1).await {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    if policy == ReauthPolicy::Disabled || !should_reauth(&error) {
        return Err(error);
    }

    debug!(event = "reauth_retry_started", failed_attempt = 1);
    reauth().await?;
    debug!(event = "reauth_retry_replaying", attempt = 2);
    op(2).await
}
