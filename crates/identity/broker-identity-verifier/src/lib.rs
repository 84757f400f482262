//! Identity provider token check over HTTP.
//!
//! The provider exposes a single endpoint: `GET` it with the token in a
//! request header and it answers `400` for a dead token or `200` with
//! `{"userID": "..."}` for a live one. Anything else fails closed.

mod client;
mod config;
mod error;

pub use client::HttpIdentityVerifier;
pub use config::VerifierConfig;
pub use error::{VerifierError, VerifierResult};

// Re-export common types for convenience
pub use broker_auth_core::{ExternalIdentity, IdentityVerifier, VerifyError};
