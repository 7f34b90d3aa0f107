//! OAuth2 authorization code flow with PKCE: verifier engine and
//! per-attempt flow correlation.
pub mod api;
pub mod config;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod random;

pub use error::PkceError;
