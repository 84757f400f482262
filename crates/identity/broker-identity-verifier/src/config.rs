//! Verifier client configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// URL of the identity provider's token check endpoint
    pub authentication_check_endpoint: String,
    pub http_timeout_seconds: u64,
    /// Request header carrying the token
    pub token_header: String,
}

impl VerifierConfig {
    pub fn new(authentication_check_endpoint: impl Into<String>) -> Self {
        Self {
            authentication_check_endpoint: authentication_check_endpoint.into(),
            http_timeout_seconds: 10,
            token_header: "token".to_string(),
        }
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn with_token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into();
        self
    }
}
