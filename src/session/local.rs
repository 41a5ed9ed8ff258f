use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{Identity, IdentityProvider};
use crate::error::{MoodboardError, Result};

/// In-process identity provider.
///
/// Anonymous sign-in mints a random uid per call. A custom token maps to a
/// stable uid (first 28 hex chars of its SHA-256), so the same owner token
/// always yields the same identity.
#[derive(Debug, Default, Clone)]
pub struct LocalIdentityProvider;

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self
    }

    fn uid_for_token(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        hex::encode(digest)[..28].to_string()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn sign_in_anonymously(&self) -> Result<Identity> {
        let bytes: [u8; 14] = rand::thread_rng().gen();
        Ok(Identity {
            uid: hex::encode(bytes),
            anonymous: true,
            id_token: None,
        })
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Identity> {
        if token.trim().is_empty() {
            return Err(MoodboardError::Identity("empty custom token".into()));
        }
        Ok(Identity {
            uid: Self::uid_for_token(token),
            anonymous: false,
            id_token: Some(token.to_string()),
        })
    }
}
