use super::{Exchanger, TokenResponse};
use crate::pkce::{verify_s256, Challenge, Verifier};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// In-memory stand-in for an authorization server, used in tests and
/// offline runs. `authorize` captures the challenge and hands out a code;
/// `exchange` recomputes the challenge from the presented verifier and
/// rejects on mismatch. Codes are single-use.
pub struct MockAuthServer {
    codes: Mutex<HashMap<String, Challenge>>,
    next_id: Mutex<u64>,
}

impl MockAuthServer {
    pub fn new() -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    /// User approved the request carrying `challenge`; returns the code
    /// that would be delivered on the redirect.
    pub fn authorize(&self, challenge: &Challenge) -> String {
        let code = {
            let mut id = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            let code = format!("mock-code-{}", *id);
            *id += 1;
            code
        };
        self.codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(code.clone(), challenge.clone());
        info!("MockAuthServer: issued {} for challenge {}", code, challenge);
        code
    }

    /// Codes issued but not yet redeemed.
    pub fn outstanding(&self) -> usize {
        self.codes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockAuthServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchanger for MockAuthServer {
    async fn exchange(&self, code: &str, verifier: &Verifier) -> Result<TokenResponse> {
        let challenge = self
            .codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(code)
            .ok_or_else(|| anyhow!("invalid_grant: unknown or already used code"))?;
        if !verify_s256(verifier.secret(), challenge.as_str()) {
            return Err(anyhow!("invalid_grant: code verifier does not match challenge"));
        }
        info!("MockAuthServer: exchanged {}", code);
        Ok(TokenResponse {
            access_token: format!("mock-access-{}", code),
            token_type: "Bearer".into(),
            expires_in: Some(28800),
            refresh_token: Some(format!("mock-refresh-{}", code)),
            scope: Some("profile activity".into()),
            user_id: None,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
