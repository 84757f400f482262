//! HTTP identity verifier.

use crate::config::VerifierConfig;
use crate::error::{VerifierError, VerifierResult};
use async_trait::async_trait;
use broker_auth_core::{ExternalIdentity, IdentityVerifier, VerifyError};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Body of a successful token check.
#[derive(Debug, Deserialize)]
struct AuthCheckerBody {
    #[serde(rename = "userID")]
    user_id: String,
}

#[derive(Clone)]
pub struct HttpIdentityVerifier {
    http_client: Client,
    endpoint: Url,
    token_header: HeaderName,
}

impl HttpIdentityVerifier {
    pub fn new(config: &VerifierConfig) -> VerifierResult<Self> {
        let endpoint = Url::parse(&config.authentication_check_endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(VerifierError::UnsupportedScheme(
                endpoint.scheme().to_string(),
            ));
        }

        let token_header = HeaderName::from_bytes(config.token_header.as_bytes())
            .map_err(|_| VerifierError::InvalidHeader(config.token_header.clone()))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            token_header,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, VerifyError> {
        // A token that cannot travel in a header can never be live.
        let header_value = HeaderValue::from_str(token).map_err(|_| {
            debug!("Token is not a valid header value, rejecting");
            VerifyError::Rejected
        })?;

        let response = self
            .http_client
            .get(self.endpoint.clone())
            .header(self.token_header.clone(), header_value)
            .send()
            .await
            .map_err(|e| {
                warn!("Token check request failed: {}", e);
                VerifyError::Unavailable(e.to_string())
            })?;

        match response.status() {
            StatusCode::BAD_REQUEST => Err(VerifyError::Rejected),
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| VerifyError::Unavailable(e.to_string()))?;

                let parsed: AuthCheckerBody = serde_json::from_slice(&body).map_err(|e| {
                    warn!("Malformed token check response: {}", e);
                    VerifyError::Unavailable(format!("malformed response body: {}", e))
                })?;

                if parsed.user_id.trim().is_empty() {
                    return Err(VerifyError::Unavailable(
                        "response carried an empty userID".to_string(),
                    ));
                }

                debug!("Token check resolved external identity {}", parsed.user_id);
                Ok(ExternalIdentity::new(parsed.user_id))
            }
            status => {
                warn!("Unexpected token check status: {}", status);
                Err(VerifyError::Unavailable(format!(
                    "unexpected status {}",
                    status
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_verifier() -> (MockServer, HttpIdentityVerifier) {
        let mock_server = MockServer::start().await;
        let config = VerifierConfig::new(format!("{}/auth/check", mock_server.uri()))
            .with_http_timeout(1);
        let verifier = HttpIdentityVerifier::new(&config).unwrap();
        (mock_server, verifier)
    }

    #[tokio::test]
    async fn test_valid_token_returns_external_identity() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .and(path("/auth/check"))
            .and(header("token", "tok-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"userID": "ext-42"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let identity = verifier.verify("tok-1").await.unwrap();
        assert_eq!(identity.as_str(), "ext-42");
    }

    #[tokio::test]
    async fn test_bad_request_rejects_token() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .and(path("/auth/check"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&mock_server)
            .await;

        assert_eq!(verifier.verify("tok-1").await, Err(VerifyError::Rejected));
    }

    #[tokio::test]
    async fn test_unexpected_status_fails_closed() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            verifier.verify("tok-1").await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_status_is_not_a_rejection() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            verifier.verify("tok-1").await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_fails_closed() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            verifier.verify("tok-1").await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_or_empty_user_id_fails_closed() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .and(header("token", "no-field"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"user": "ext-42"})),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(header("token", "empty-field"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"userID": ""})),
            )
            .mount(&mock_server)
            .await;

        assert!(matches!(
            verifier.verify("no-field").await,
            Err(VerifyError::Unavailable(_))
        ));
        assert!(matches!(
            verifier.verify("empty-field").await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"userID": "ext-42"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        assert!(matches!(
            verifier.verify("tok-1").await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails_closed() {
        let config = VerifierConfig::new("http://127.0.0.1:1/auth/check").with_http_timeout(1);
        let verifier = HttpIdentityVerifier::new(&config).unwrap();

        assert!(matches!(
            verifier.verify("tok-1").await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_header_unsafe_token_is_rejected_without_request() {
        let (mock_server, verifier) = setup_verifier().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        assert_eq!(
            verifier.verify("tok\n-1").await,
            Err(VerifyError::Rejected)
        );
    }

    #[tokio::test]
    async fn test_custom_token_header() {
        let mock_server = MockServer::start().await;
        let config = VerifierConfig::new(format!("{}/check", mock_server.uri()))
            .with_token_header("x-session-token");
        let verifier = HttpIdentityVerifier::new(&config).unwrap();

        Mock::given(method("GET"))
            .and(header("x-session-token", "tok-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"userID": "ext-7"})),
            )
            .mount(&mock_server)
            .await;

        assert_eq!(verifier.verify("tok-1").await.unwrap().as_str(), "ext-7");
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            HttpIdentityVerifier::new(&VerifierConfig::new("not a url")),
            Err(VerifierError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            HttpIdentityVerifier::new(&VerifierConfig::new("ftp://example.com/check")),
            Err(VerifierError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HttpIdentityVerifier::new(
                &VerifierConfig::new("http://example.com/check").with_token_header("bad header")
            ),
            Err(VerifierError::InvalidHeader(_))
        ));
    }
}
