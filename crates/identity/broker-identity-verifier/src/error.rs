//! Verifier construction errors.

use thiserror::Error;

pub type VerifierResult<T> = Result<T, VerifierError>;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("Invalid authentication check endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid token header name: {0}")]
    InvalidHeader(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
