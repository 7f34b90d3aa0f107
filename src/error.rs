use thiserror::Error;

/// Failure kinds of the PKCE handshake core.
///
/// None of the variants ever carries verifier material. `UnknownAttempt`
/// holds the attempt token, which is not a secret.
#[derive(Debug, Error)]
pub enum PkceError {
    /// The OS entropy source failed; the attempt is abandoned, never retried.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Bad bound or length configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Callback presented a token with no live attempt (expired, already used or forged).
    #[error("unknown authorization attempt: {0}")]
    UnknownAttempt(String),

    /// The authorization server rejected the code/verifier pair.
    #[error("token exchange rejected: {0}")]
    ExchangeRejected(String),
}
