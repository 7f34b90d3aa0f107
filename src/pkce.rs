//! PKCE S256 verifier generation and challenge derivation (RFC 7636).

use crate::error::PkceError;
use crate::random::RandomSource;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const VERIFIER_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const DEFAULT_VERIFIER_LENGTH: usize = 96;
pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;
pub const CHALLENGE_METHOD: &str = "S256";

/// Secret code verifier. Zeroed on drop; `Debug` is redacted and there is
/// no `Display`, so getting at the raw value means calling `secret()`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Verifier {
    code: String,
}

impl Verifier {
    /// Raw secret form, as sent in the `code_verifier` token request field.
    pub fn secret(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn challenge(&self) -> Challenge {
        compute_challenge(self.code.as_bytes())
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Verifier(<redacted, {} chars>)", self.code.len())
    }
}

/// Public S256 challenge: base64url (no padding) of the verifier's SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Challenge(String);

impl Challenge {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Challenge {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn compute_challenge(verifier: &[u8]) -> Challenge {
    let hash = Sha256::digest(verifier);
    Challenge(URL_SAFE_NO_PAD.encode(hash))
}

/// What the token endpoint does: recompute from the presented verifier and compare.
pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    compute_challenge(verifier.as_bytes()).as_str() == challenge
}

/// Draw `length` characters from `alphabet`, one `next(alphabet.len())` per position.
/// Either every draw succeeds or nothing is returned; the partial buffer is zeroed.
pub(crate) fn draw_string(
    source: &dyn RandomSource,
    alphabet: &[u8],
    length: usize,
) -> Result<Zeroizing<String>, PkceError> {
    if alphabet.is_empty() {
        return Err(PkceError::InvalidArgument("empty alphabet".into()));
    }
    let mut out = Zeroizing::new(String::with_capacity(length));
    for _ in 0..length {
        let idx = source.next(alphabet.len())?;
        let ch = alphabet.get(idx).ok_or_else(|| {
            PkceError::InvalidArgument(format!(
                "random index {} outside alphabet of {}",
                idx,
                alphabet.len()
            ))
        })?;
        out.push(char::from(*ch));
    }
    Ok(out)
}

/// Generates verifiers of a fixed, startup-validated length.
#[derive(Clone)]
pub struct PkceEngine {
    source: Arc<dyn RandomSource>,
    length: usize,
}

impl PkceEngine {
    pub fn new(source: Arc<dyn RandomSource>, length: usize) -> Result<Self, PkceError> {
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
            return Err(PkceError::InvalidArgument(format!(
                "verifier length {} outside {}..={}",
                length, MIN_VERIFIER_LENGTH, MAX_VERIFIER_LENGTH
            )));
        }
        Ok(Self { source, length })
    }

    pub fn with_default_length(source: Arc<dyn RandomSource>) -> Self {
        Self {
            source,
            length: DEFAULT_VERIFIER_LENGTH,
        }
    }

    pub fn verifier_length(&self) -> usize {
        self.length
    }

    pub(crate) fn source(&self) -> &dyn RandomSource {
        self.source.as_ref()
    }

    pub fn generate_verifier(&self) -> Result<Verifier, PkceError> {
        let mut drawn = draw_string(self.source.as_ref(), VERIFIER_ALPHABET, self.length)?;
        Ok(Verifier {
            code: std::mem::take(&mut *drawn),
        })
    }
}

impl fmt::Debug for PkceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceEngine")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
