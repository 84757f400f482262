//! HTTP routes.

use crate::config::CorsConfig;
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use broker_auth_core::{AuthError, Authentication, BrokerAuthResult, ExternalIdentity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info, warn};

/// Request header carrying the caller's token.
pub const TOKEN_HEADER: &str = "token";

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    BadRequest(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthenticated" })),
            )
                .into_response(),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MappingsRequest {
    #[serde(rename = "userIDs")]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MappingsResponse {
    pub mappings: BTreeMap<String, String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/profiles", post(create_profile))
        .route("/v1/profiles/mappings", post(get_mappings))
        .with_state(state)
}

pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.allow_any_origin {
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin '{}'", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

async fn health() -> &'static str {
    "OK"
}

async fn create_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BrokerAuthResult>, ApiError> {
    let authentication = authenticate(&state, &headers).await?;
    Ok(Json(authentication.credentials))
}

async fn get_mappings(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MappingsResponse>, ApiError> {
    authenticate(&state, &headers).await?;

    let request: MappingsRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting mappings request body: {}", e);
        ApiError::BadRequest("invalid request body")
    })?;

    let external_identities: Vec<ExternalIdentity> = request
        .user_ids
        .into_iter()
        .map(ExternalIdentity::new)
        .collect();

    let resolved = state
        .reconciler
        .resolve_mappings(&external_identities)
        .await
        .map_err(|e| {
            error!("Failed to resolve identity mappings: {}", e);
            ApiError::Unauthenticated
        })?;

    let mappings = resolved
        .into_iter()
        .map(|(external, internal)| (external.as_str().to_string(), internal.into_inner()))
        .collect();

    Ok(Json(MappingsResponse { mappings }))
}

/// Resolves the caller's token and makes sure the broker can authenticate
/// the resulting identity, whichever route the token is first seen on.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Authentication, ApiError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if let Some(pattern) = &state.token_pattern {
        if !token.is_empty() && !pattern.is_match(token) {
            info!("Token failed format validation");
            return Err(ApiError::Unauthenticated);
        }
    }

    let authentication = state
        .reconciler
        .check_authentication(token)
        .await
        .map_err(|e| {
            match &e {
                AuthError::EmptyToken | AuthError::InvalidToken => {
                    info!("Authentication refused: {}", e)
                }
                _ => warn!("Authentication failed: {}", e),
            }
            ApiError::Unauthenticated
        })?;

    project(state, token, &authentication).await?;

    Ok(authentication)
}

/// Writes the broker ACL record for a provisioned or rotated identity.
///
/// Cached outcomes never reach the store, so a session entry must not
/// outlive a failed write: it is dropped and the next call for the token
/// reconciles and projects again.
async fn project(
    state: &AppState,
    token: &str,
    authentication: &Authentication,
) -> Result<(), ApiError> {
    let Err(e) = state.projector.project(authentication).await else {
        return Ok(());
    };

    let internal = &authentication.internal_identity;
    error!(internal_identity = %internal, "Failed to project broker credentials: {}", e);

    match state.reconciler.invalidate_session(token, internal).await {
        Ok(true) => {}
        Ok(false) => warn!(internal_identity = %internal, "Session entry already gone"),
        Err(e) => error!(
            internal_identity = %internal,
            "Failed to invalidate session after projection failure: {}", e
        ),
    }

    Err(ApiError::Unauthenticated)
}
