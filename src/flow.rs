//! Per-attempt correlation between "challenge issued" and "verifier presented".
//!
//! Each `begin_authorization` issues an opaque attempt token and retains the
//! verifier under that token. The callback presents the token back; the
//! entry is removed before the exchange runs, so a verifier is used at most
//! once whatever the outcome. Entries older than the TTL are treated as
//! unknown on access and dropped by `sweep_expired`.

use crate::api::{Exchanger, TokenResponse};
use crate::error::PkceError;
use crate::pkce::{draw_string, Challenge, PkceEngine, Verifier};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// URL-safe base64 alphabet; tokens look like 32 random bytes base64url-encoded.
const ATTEMPT_TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const ATTEMPT_TOKEN_LENGTH: usize = 43;

pub const DEFAULT_ATTEMPT_TTL: Duration = Duration::from_secs(600);

/// Opaque correlator for one authorization attempt. Not a secret: it is
/// sent to the browser as the OAuth `state` and may be logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptToken(String);

impl AttemptToken {
    fn generate(engine: &PkceEngine) -> Result<Self, PkceError> {
        let drawn = draw_string(engine.source(), ATTEMPT_TOKEN_ALPHABET, ATTEMPT_TOKEN_LENGTH)?;
        Ok(Self(drawn.as_str().to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for AttemptToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

struct PendingAttempt {
    verifier: Verifier,
    challenge: Challenge,
    issued_at: Instant,
}

impl PendingAttempt {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.issued_at) >= ttl
    }
}

/// Concurrency-safe map from attempt token to retained verifier.
/// Clones share the same map.
#[derive(Clone)]
pub struct FlowStore {
    engine: PkceEngine,
    exchanger: Arc<dyn Exchanger>,
    ttl: Duration,
    attempts: Arc<Mutex<HashMap<AttemptToken, PendingAttempt>>>,
}

impl FlowStore {
    pub fn new(engine: PkceEngine, exchanger: Arc<dyn Exchanger>, ttl: Duration) -> Result<Self, PkceError> {
        if ttl.is_zero() {
            return Err(PkceError::InvalidArgument(
                "attempt ttl must be positive".into(),
            ));
        }
        Ok(Self {
            engine,
            exchanger,
            ttl,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AttemptToken, PendingAttempt>> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Idle -> AwaitingCallback. Returns the attempt token (to be echoed back
    /// via `state`) and the challenge for the authorization URL.
    pub fn begin_authorization(&self) -> Result<(AttemptToken, Challenge), PkceError> {
        let verifier = self.engine.generate_verifier()?;
        let token = AttemptToken::generate(&self.engine)?;
        let challenge = verifier.challenge();
        let now = Instant::now();

        let mut attempts = self.lock();
        let ttl = self.ttl;
        attempts.retain(|_, a| !a.is_expired(ttl, now));
        attempts.insert(
            token.clone(),
            PendingAttempt {
                verifier,
                challenge: challenge.clone(),
                issued_at: now,
            },
        );
        let pending = attempts.len();
        drop(attempts);

        info!(attempt = %token, challenge = %challenge, pending, "authorization attempt started");
        Ok((token, challenge))
    }

    /// AwaitingCallback -> Completed (or failed). The attempt is consumed
    /// before the exchange; a second call with the same token is `UnknownAttempt`.
    pub async fn complete_authorization(
        &self,
        attempt_token: &str,
        code: &str,
    ) -> Result<TokenResponse, PkceError> {
        let attempt = self.take_live(attempt_token)?;
        debug!(
            attempt = attempt_token,
            challenge = %attempt.challenge,
            exchanger = self.exchanger.name(),
            "exchanging authorization code"
        );

        match self.exchanger.exchange(code, &attempt.verifier).await {
            Ok(token) => {
                info!(attempt = attempt_token, "authorization attempt completed");
                Ok(token)
            }
            Err(e) => {
                warn!(attempt = attempt_token, error = %e, "token exchange rejected");
                Err(PkceError::ExchangeRejected(e.to_string()))
            }
        }
    }

    fn take_live(&self, attempt_token: &str) -> Result<PendingAttempt, PkceError> {
        let removed = self.lock().remove(attempt_token);
        match removed {
            Some(a) if !a.is_expired(self.ttl, Instant::now()) => Ok(a),
            Some(_) => {
                warn!(attempt = attempt_token, "callback for expired authorization attempt");
                Err(PkceError::UnknownAttempt(attempt_token.to_owned()))
            }
            None => {
                warn!(attempt = attempt_token, "callback for unknown authorization attempt");
                Err(PkceError::UnknownAttempt(attempt_token.to_owned()))
            }
        }
    }

    /// Drop every expired attempt; returns how many were discarded.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut attempts = self.lock();
        let before = attempts.len();
        attempts.retain(|_, a| !a.is_expired(ttl, now));
        let removed = before - attempts.len();
        drop(attempts);
        if removed > 0 {
            debug!(removed, "swept expired authorization attempts");
        }
        removed
    }

    /// Attempts currently awaiting a callback (expired ones included until swept).
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Run `sweep_expired` every `every` on the current tokio runtime.
    /// Abort the returned handle to stop it.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }
}

impl fmt::Debug for FlowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowStore")
            .field("ttl", &self.ttl)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
