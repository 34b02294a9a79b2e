//! Construction credentials and the shared access-token store.
//!
//! `TokenStore` is the single mutation point for the bearer token. Call sites
//! read it when a request is built, never earlier, so a refresh that lands
//! between two calls is always observed by the second one.

use std::sync::{Arc, PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};

use crate::api::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// Credentials supplied when building an [`ApiClient`](crate::api::client::ApiClient).
///
/// At least one of the two values must be non-empty. When both are present the
/// access token is used immediately and the cookie is kept for refreshes.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    /// Short-lived bearer token.
    pub access_token: Option<SecretString>,
    /// Long-lived refresh cookie string (`name=value; name2=value2`).
    pub refresh_cookie: Option<SecretString>,
}

impl Credentials {
    pub fn new(access_token: Option<String>, refresh_cookie: Option<String>) -> Self {
        Self {
            access_token: access_token.map(SecretString::new),
            refresh_cookie: refresh_cookie.map(SecretString::new),
        }
    }

    /// Token-only credentials. No automatic refresh is possible.
    pub fn token(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(SecretString::new(access_token.into())),
            refresh_cookie: None,
        }
    }

    /// Cookie-only credentials. An access token is minted at construction.
    pub fn cookie(refresh_cookie: impl Into<String>) -> Self {
        Self {
            access_token: None,
            refresh_cookie: Some(SecretString::new(refresh_cookie.into())),
        }
    }

    /// Adds a refresh cookie to existing credentials.
    pub fn with_refresh_cookie(mut self, refresh_cookie: impl Into<String>) -> Self {
        self.refresh_cookie = Some(SecretString::new(refresh_cookie.into()));
        self
    }

    /// Strips a leading `Bearer ` from the token and drops blank values.
    ///
    /// Fails with [`ApiError::NoAuthData`] when nothing usable remains.
    pub(crate) fn normalized(self) -> Result<Self, ApiError> {
        let access_token = self
            .access_token
            .map(|token| {
                let raw = token.expose_secret();
                raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw).trim().to_string()
            })
            .filter(|token| !token.is_empty())
            .map(SecretString::new);
        let refresh_cookie = self
            .refresh_cookie
            .map(|cookie| cookie.expose_secret().trim().to_string())
            .filter(|cookie| !cookie.is_empty())
            .map(SecretString::new);

        if access_token.is_none() && refresh_cookie.is_none() {
            return Err(ApiError::NoAuthData);
        }

        Ok(Self {
            access_token,
            refresh_cookie,
        })
    }
}

/// Shared, atomically replaced access token.
///
/// Clones share the same slot, so the REST client and every stream client
/// built from it observe a refresh immediately.
#[derive(Clone, Debug)]
pub struct TokenStore {
    slot: Arc<RwLock<SecretString>>,
}

impl TokenStore {
    pub fn new(token: SecretString) -> Self {
        Self {
            slot: Arc::new(RwLock::new(token)),
        }
    }

    /// Returns the token as of this call.
    pub fn current(&self) -> SecretString {
        // The slot only ever holds a fully written value, so a poisoned lock
        // still guards a whole token.
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the token in place.
    pub(crate) fn replace(&self, token: SecretString) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::{Credentials, TokenStore};
    use crate::api::error::ApiError;

    #[test]
    fn bearer_prefix_is_stripped() {
        let credentials = Credentials::token("Bearer abc.def")
            .normalized()
            .expect("token credentials");
        assert_eq!(
            credentials.access_token.expect("token").expose_secret(),
            "abc.def"
        );
        assert!(credentials.refresh_cookie.is_none());
    }

    #[test]
    fn blank_credentials_are_rejected() {
        let error = Credentials::token("   ")
            .normalized()
            .expect_err("blank token alone is not usable");
        assert!(matches!(error, ApiError::NoAuthData));

        let error = Credentials::new(None, Some(" \n".to_string()))
            .normalized()
            .expect_err("blank cookie alone is not usable");
        assert!(matches!(error, ApiError::NoAuthData));

        let error = Credentials::default()
            .normalized()
            .expect_err("no credentials");
        assert!(matches!(error, ApiError::NoAuthData));
    }

    #[test]
    fn token_and_cookie_are_both_kept() {
        let credentials = Credentials::token("abc")
            .with_refresh_cookie("refresh_token=xyz")
            .normalized()
            .expect("both credentials");
        assert!(credentials.access_token.is_some());
        assert_eq!(
            credentials.refresh_cookie.expect("cookie").expose_secret(),
            "refresh_token=xyz"
        );
    }

    #[test]
    fn clones_share_the_same_token_slot() {
        let store = TokenStore::new(SecretString::new("old".to_string()));
        let reader = store.clone();
        store.replace(SecretString::new("new".to_string()));
        assert_eq!(reader.current().expose_secret(), "new");
    }
}
