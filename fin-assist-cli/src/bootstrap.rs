//! Session bootstrap: restore a persisted token and verify it

use crate::client::Backend;
use fin_assist_core::{KeyValueStore, SessionToken};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Authentication state of the client
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No usable token
    Anonymous,
    /// Token present but not yet confirmed by the backend
    Unverified(SessionToken),
    /// Token confirmed by `/me`
    Verified { token: SessionToken, profile: Value },
}

impl AuthState {
    /// Whether the UI should treat the user as logged in
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, AuthState::Anonymous)
    }

    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            AuthState::Anonymous => None,
            AuthState::Unverified(token) | AuthState::Verified { token, .. } => Some(token),
        }
    }
}

/// Read the persisted token and trust it until verified
pub fn restore(store: &dyn KeyValueStore) -> AuthState {
    match store.token() {
        Some(token) => {
            debug!("Restored persisted session token");
            AuthState::Unverified(token)
        }
        None => AuthState::Anonymous,
    }
}

/// Confirm the token against the backend.
///
/// Any failure, network or HTTP, demotes the client to anonymous. The
/// stored token is cleared only when it is the token that failed.
pub async fn verify(store: &dyn KeyValueStore, backend: &dyn Backend, state: AuthState) -> AuthState {
    match state {
        AuthState::Unverified(token) => confirm(store, backend, token).await,
        other => other,
    }
}

async fn confirm(store: &dyn KeyValueStore, backend: &dyn Backend, token: SessionToken) -> AuthState {
    match backend.me().await {
        Ok(profile) => {
            info!("Session token verified");
            AuthState::Verified { token, profile }
        }
        Err(e) => {
            warn!("Session verification failed: {}", e);
            if let Err(e) = store.discard_token(&token) {
                warn!("Failed to clear stored token: {}", e);
            }
            AuthState::Anonymous
        }
    }
}

/// Human-readable name from a `/me` profile
pub fn display_name(profile: &Value) -> Option<String> {
    let field = |key: &str| profile.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    field("username")
        .or_else(|| field("name"))
        .or_else(|| field("email"))
        .map(ToString::to_string)
}
