use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::pkce::{DEFAULT_VERIFIER_LENGTH, MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH};

pub const CLIENT_ID_ENV: &str = "OAUTH_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
pub const REDIRECT_URL_ENV: &str = "OAUTH_REDIRECT_URL";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub pkce: PkceSettings,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Deserialize, Clone)]
pub struct OAuthSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PkceSettings {
    #[serde(default = "default_verifier_length")]
    pub verifier_length: usize,
    /// How long an attempt waits for its callback before it is discarded.
    #[serde(default = "default_attempt_ttl")]
    pub attempt_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_log_dir() -> PathBuf { "/var/log/pkce-handshake".into() }
fn default_auth_url() -> String { "https://www.fitbit.com/oauth2/authorize".into() }
fn default_token_url() -> String { "https://api.fitbit.com/oauth2/token".into() }
fn default_profile_url() -> String { "https://api.fitbit.com/1/user/-/profile.json".into() }
fn default_scopes() -> Vec<String> { vec!["profile".into(), "activity".into()] }
fn default_verifier_length() -> usize { DEFAULT_VERIFIER_LENGTH }
fn default_attempt_ttl() -> u64 { 600 }
fn default_sweep_interval() -> u64 { 60 }

impl Default for Config {
    fn default() -> Self {
        Self {
            oauth: OAuthSettings::default(),
            pkce: PkceSettings::default(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            profile_url: default_profile_url(),
            scopes: default_scopes(),
        }
    }
}

// client_secret stays out of logs
impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Default for PkceSettings {
    fn default() -> Self {
        Self {
            verifier_length: default_verifier_length(),
            attempt_ttl_secs: default_attempt_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl PkceSettings {
    pub fn attempt_ttl(&self) -> Duration {
        Duration::from_secs(self.attempt_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load from TOML, then let the environment override credentials.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&s)?;
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Non-blank values returned by `lookup` replace the file's credentials.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = pick(CLIENT_ID_ENV) {
            self.oauth.client_id = v;
        }
        if let Some(v) = pick(CLIENT_SECRET_ENV) {
            self.oauth.client_secret = v;
        }
        if let Some(v) = pick(REDIRECT_URL_ENV) {
            self.oauth.redirect_url = v;
        }
    }

    /// Startup checks; a bad config fails here rather than per request.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("oauth.client_id", CLIENT_ID_ENV, &self.oauth.client_id),
            ("oauth.client_secret", CLIENT_SECRET_ENV, &self.oauth.client_secret),
            ("oauth.redirect_url", REDIRECT_URL_ENV, &self.oauth.redirect_url),
        ];
        for (field, env, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow!("missing config for {} (or env {})", field, env));
            }
        }
        for (field, value) in [
            ("oauth.auth_url", &self.oauth.auth_url),
            ("oauth.token_url", &self.oauth.token_url),
            ("oauth.profile_url", &self.oauth.profile_url),
            ("oauth.redirect_url", &self.oauth.redirect_url),
        ] {
            url::Url::parse(value).map_err(|e| anyhow!("invalid {} {:?}: {}", field, value, e))?;
        }
        let len = self.pkce.verifier_length;
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&len) {
            return Err(anyhow!(
                "pkce.verifier_length {} outside {}..={}",
                len,
                MIN_VERIFIER_LENGTH,
                MAX_VERIFIER_LENGTH
            ));
        }
        if self.pkce.attempt_ttl_secs == 0 {
            return Err(anyhow!("pkce.attempt_ttl_secs must be positive"));
        }
        if self.pkce.sweep_interval_secs == 0 {
            return Err(anyhow!("pkce.sweep_interval_secs must be positive"));
        }
        Ok(())
    }
}
