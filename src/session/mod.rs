//! Session bootstrap: establish an identity before touching the store.
//!
//! Sign-in is attempted once at startup, with a custom token when one is
//! configured and anonymously otherwise. Failure never aborts the app: the
//! session falls back to local-only mode, where content renders from
//! defaults and writes are refused.

pub mod local;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{MoodboardError, Result};

pub use local::LocalIdentityProvider;
pub use rest::RestIdentityProvider;

/// A signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub anonymous: bool,
    /// Bearer token issued by the provider, if any.
    #[serde(skip_serializing)]
    pub id_token: Option<String>,
}

/// Identity provider boundary.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    async fn sign_in_anonymously(&self) -> Result<Identity>;

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Identity>;
}

/// Provider that refuses every sign-in. Stands in when the configured
/// provider can't be built, so the session degrades like any other failure.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for UnavailableProvider {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn sign_in_anonymously(&self) -> Result<Identity> {
        Err(MoodboardError::Identity(self.reason.clone()))
    }

    async fn sign_in_with_custom_token(&self, _token: &str) -> Result<Identity> {
        Err(MoodboardError::Identity(self.reason.clone()))
    }
}

/// Outcome of the bootstrap step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Authenticated(Identity),
    /// Sign-in failed; the app runs without store access.
    LocalOnly { reason: String },
}

impl SessionState {
    /// State for an identity read off the change feed.
    pub fn from_identity(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::LocalOnly {
                reason: "not signed in".into(),
            },
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated(identity) => Some(identity),
            SessionState::LocalOnly { .. } => None,
        }
    }
}

/// Signs in through an injected provider and publishes the current identity.
pub struct SessionBootstrapper {
    provider: Arc<dyn IdentityProvider>,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl SessionBootstrapper {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            provider,
            identity_tx,
        }
    }

    /// Sign in: custom token when given (and non-blank), anonymous otherwise.
    pub async fn bootstrap(&self, initial_token: Option<&str>) -> SessionState {
        let token = initial_token.map(str::trim).filter(|t| !t.is_empty());
        let attempt = match token {
            Some(token) => {
                tracing::info!("Signing in with custom token via {}", self.provider.name());
                self.provider.sign_in_with_custom_token(token).await
            }
            None => {
                tracing::info!("Signing in anonymously via {}", self.provider.name());
                self.provider.sign_in_anonymously().await
            }
        };

        match attempt {
            Ok(identity) => {
                tracing::info!(
                    "Signed in as {} ({})",
                    identity.uid,
                    if identity.anonymous { "anonymous" } else { "token" }
                );
                self.identity_tx.send_replace(Some(identity.clone()));
                SessionState::Authenticated(identity)
            }
            Err(e) => {
                tracing::warn!("Sign-in failed: {}; continuing in local-only mode", e);
                self.identity_tx.send_replace(None);
                SessionState::LocalOnly {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Receiver that observes every identity change.
    pub fn on_identity_change(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    pub fn current(&self) -> Option<Identity> {
        self.identity_tx.borrow().clone()
    }

    pub fn sign_out(&self) {
        if self.identity_tx.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
    }
}
