pub mod mock;
pub mod oauth;

use crate::pkce::Verifier;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Token endpoint response for the authorization_code grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Fitbit returns the encoded user id alongside the tokens.
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

impl TokenResponse {
    /// Absolute expiry in epoch seconds, if the server reported a lifetime.
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs)
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Exchanges an authorization code plus the PKCE verifier for tokens.
/// Implementations: oauth::OAuthClient (HTTP) and mock::MockAuthServer.
#[async_trait::async_trait]
pub trait Exchanger: Send + Sync {
    async fn exchange(&self, code: &str, verifier: &Verifier) -> Result<TokenResponse>;

    /// Exchanger name (for logging)
    fn name(&self) -> &str;
}
