//! The vault server's HTTP surface.

mod asset_routes;
mod import_routes;
pub mod state;

pub use state::ServerState;

use anyhow::Result;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

/// HTTP-facing configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Static bearer token required on every API call.
    pub api_token: String,
    /// Base URL signed upload URLs point at.
    pub public_base_url: String,
    /// Lifetime of signed upload URLs, milliseconds.
    pub upload_url_ttl_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: message.into(),
        })
    }
}

/// Extractor enforcing the static bearer token. Signed uploads are the one
/// route that skips it; their signature is the credential.
pub struct ApiAuth;

impl<S> FromRequestParts<S> for ApiAuth
where
    ServerConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = ServerConfig::from_ref(state);
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) if token == config.api_token => Ok(ApiAuth),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn make_router(state: ServerState) -> Router {
    Router::new()
        .nest("/api/import", import_routes::make_routes())
        .nest("/api", asset_routes::make_routes())
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run_server(state: ServerState, port: u16) -> Result<()> {
    let app = make_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
