//! The registration contract: versions, asset lookup/registration and
//! signed uploads. The watcher agent is the main consumer, through
//! `VaultApiClient`.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::TryStreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::state::{
    GuardedObjectStorage, GuardedUploadSigner, GuardedVaultStore, ServerState,
};
use super::{ApiAuth, ErrorResponse, ServerConfig};
use crate::api_client::{
    CreateVersionBody, CreateVersionResponse, LookupResponse, RegisterAssetResponse,
    SignUploadBody,
};
use crate::vault_store::{NewVaultAsset, ProjectSource, ProjectVersion, VaultAsset};

#[derive(Debug, Deserialize)]
struct LookupQuery {
    provider: String,
    source_file_id: String,
    revision: String,
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    expires: i64,
    sig: String,
}

#[derive(Debug, Deserialize)]
struct SetSourceBody {
    provider: String,
    folder_id: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

pub fn make_routes() -> Router<ServerState> {
    Router::new()
        .route("/projects/{id}/versions", post(create_version))
        .route("/projects/{id}/source", post(set_project_source))
        .route("/assets", post(register_asset))
        .route("/assets/lookup", get(lookup_asset))
        .route("/uploads/sign", post(sign_upload))
        .route("/uploads/{*key}", put(receive_upload))
}

/// POST /api/projects/{id}/versions
async fn create_version(
    _auth: ApiAuth,
    State(store): State<GuardedVaultStore>,
    Path(project_id): Path<String>,
    Json(body): Json<CreateVersionBody>,
) -> impl IntoResponse {
    let version = ProjectVersion::new(&project_id, &body.label);
    match store.create_version(&version) {
        Ok(()) => {
            debug!("created version {} for project {}", version.id, project_id);
            Json(CreateVersionResponse {
                version_id: version.id,
            })
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()),
        )
            .into_response(),
    }
}

/// POST /api/projects/{id}/source - configure the remote folder imports
/// pull from.
async fn set_project_source(
    _auth: ApiAuth,
    State(store): State<GuardedVaultStore>,
    Path(project_id): Path<String>,
    Json(body): Json<SetSourceBody>,
) -> impl IntoResponse {
    let source = ProjectSource {
        project_id: project_id.clone(),
        provider: body.provider,
        folder_id: body.folder_id,
        active: body.active,
    };
    match store.upsert_project_source(&source) {
        Ok(()) => {
            info!(
                "project {} source set to {}:{} (active: {})",
                project_id, source.provider, source.folder_id, source.active
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()),
        )
            .into_response(),
    }
}

/// GET /api/assets/lookup - the agent-side dedup check.
async fn lookup_asset(
    _auth: ApiAuth,
    State(store): State<GuardedVaultStore>,
    Query(query): Query<LookupQuery>,
) -> impl IntoResponse {
    match store.asset_exists(&query.provider, &query.source_file_id, &query.revision) {
        Ok(exists) => Json(LookupResponse { exists }).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()),
        )
            .into_response(),
    }
}

/// POST /api/assets
async fn register_asset(
    _auth: ApiAuth,
    State(store): State<GuardedVaultStore>,
    Json(body): Json<NewVaultAsset>,
) -> impl IntoResponse {
    match store.asset_exists(
        &body.source_provider,
        &body.source_file_id,
        &body.source_revision,
    ) {
        Ok(true) => {
            return (
                StatusCode::CONFLICT,
                ErrorResponse::new(format!(
                    "asset {}/{} at revision {} is already registered",
                    body.source_provider, body.source_file_id, body.source_revision
                )),
            )
                .into_response();
        }
        Ok(false) => {}
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()),
            )
                .into_response();
        }
    }

    let asset = VaultAsset::from_new(body);
    match store.insert_asset(&asset) {
        Ok(()) => {
            info!("registered asset {} ({})", asset.id, asset.file_name);
            Json(RegisterAssetResponse { asset_id: asset.id }).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()),
        )
            .into_response(),
    }
}

/// POST /api/uploads/sign - issue a time-limited signed upload URL.
async fn sign_upload(
    _auth: ApiAuth,
    State(config): State<ServerConfig>,
    State(signer): State<GuardedUploadSigner>,
    State(storage): State<GuardedObjectStorage>,
    Json(body): Json<SignUploadBody>,
) -> impl IntoResponse {
    // Reject keys the storage would refuse before signing them
    if let Err(e) = storage.path_for(&body.key) {
        return (StatusCode::BAD_REQUEST, ErrorResponse::new(e.to_string())).into_response();
    }
    let signed = signer.sign(&config.public_base_url, &body.key, config.upload_url_ttl_ms);
    Json(signed).into_response()
}

/// PUT /api/uploads/{key}?expires&sig - signature-authenticated streaming
/// upload.
async fn receive_upload(
    State(signer): State<GuardedUploadSigner>,
    State(storage): State<GuardedObjectStorage>,
    Path(key): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> impl IntoResponse {
    if !signer.verify(&key, query.expires, &query.sig) {
        warn!("rejecting upload for {}: bad or expired signature", key);
        return (
            StatusCode::FORBIDDEN,
            ErrorResponse::new("invalid or expired upload signature"),
        )
            .into_response();
    }

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    match storage.put_stream(&key, stream).await {
        Ok(written) => {
            debug!("stored upload {} ({} bytes)", key, written);
            StatusCode::CREATED.into_response()
        }
        Err(e) => {
            warn!("failed to store upload {}: {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()),
            )
                .into_response()
        }
    }
}
