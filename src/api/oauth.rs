use super::{Exchanger, TokenResponse};
use crate::config::OAuthSettings;
use crate::flow::AttemptToken;
use crate::pkce::{Challenge, Verifier};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use url::Url;

/// OAuth2 client for the authorization server: builds the authorize URL,
/// performs the authorization_code exchange with the PKCE verifier and
/// fetches the profile resource with the resulting bearer token.
pub struct OAuthClient {
    client: Client,
    settings: OAuthSettings,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Outbound authorization URL. The attempt token travels as `state`
    /// and comes back on the callback.
    pub fn authorize_url(&self, challenge: &Challenge, state: &AttemptToken) -> Result<Url> {
        let mut url = Url::parse(&self.settings.auth_url)
            .with_context(|| format!("invalid auth_url {}", self.settings.auth_url))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_url)
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", challenge.method())
            .append_pair("state", state.as_str());
        Ok(url)
    }

    fn basic_auth_header(&self) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.settings.client_id, self.settings.client_secret
            ))
        )
    }

    /// GET the profile resource with the bearer token.
    pub async fn fetch_profile(&self, token: &TokenResponse) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(&self.settings.profile_url)
            .header(AUTHORIZATION, token.bearer())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            warn!("profile fetch failed with status {}", status);
            return Err(anyhow!("profile fetch failed: {} => {}", status, txt));
        }
        let j: serde_json::Value = resp.json().await?;
        Ok(j)
    }
}

#[async_trait]
impl Exchanger for OAuthClient {
    async fn exchange(&self, code: &str, verifier: &Verifier) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_url.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("code_verifier", verifier.secret()),
        ];
        debug!(
            "exchanging authorization code at {} (challenge {})",
            self.settings.token_url,
            verifier.challenge()
        );
        let resp = self
            .client
            .post(&self.settings.token_url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("token exchange failed: {} => {}", status, txt));
        }
        let tr: TokenResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("parse token response: {}", e))?;
        Ok(tr)
    }

    fn name(&self) -> &str {
        "oauth"
    }
}
