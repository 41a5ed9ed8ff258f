use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Identity, IdentityProvider};
use crate::config::IdentityConfig;
use crate::error::{MoodboardError, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    local_id: Option<String>,
}

/// Client for an Identity-Toolkit-style REST sign-in API.
#[derive(Clone)]
pub struct RestIdentityProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl RestIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MoodboardError::Config("identity.api_key is required".into()))?;

        crate::ensure_tls_provider();

        Ok(Self {
            client: Client::new(),
            base_url: config.auth_base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}?key={}", self.base_url, method, self.api_key)
    }

    async fn post<B: Serialize + Sync>(&self, method: &str, body: &B) -> Result<SignInResponse> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MoodboardError::Identity(format!("provider unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MoodboardError::Identity(format!(
                "{} returned {}: {}",
                method, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MoodboardError::Identity(format!("Failed to parse sign-in reply: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn sign_in_anonymously(&self) -> Result<Identity> {
        let reply = self
            .post(
                "signUp",
                &SignUpRequest {
                    return_secure_token: true,
                },
            )
            .await?;

        let uid = reply
            .local_id
            .ok_or_else(|| MoodboardError::Identity("signUp reply has no localId".into()))?;

        Ok(Identity {
            uid,
            anonymous: true,
            id_token: Some(reply.id_token),
        })
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Identity> {
        let reply = self
            .post(
                "signInWithCustomToken",
                &CustomTokenRequest {
                    token,
                    return_secure_token: true,
                },
            )
            .await?;

        // The custom-token reply omits localId on some deployments; the
        // token itself is then the only stable handle.
        let uid = match reply.local_id {
            Some(uid) => uid,
            None => super::LocalIdentityProvider::new()
                .sign_in_with_custom_token(token)
                .await?
                .uid,
        };

        Ok(Identity {
            uid,
            anonymous: false,
            id_token: Some(reply.id_token),
        })
    }
}
