//! Import control routes: start a remote import, poll jobs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::state::{GuardedImportJobStore, GuardedImportService, ServerState};
use super::{ApiAuth, ErrorResponse};
use crate::import::{ImportError, ImportJob};

#[derive(Debug, Deserialize)]
struct StartImportBody {
    project_id: String,
}

#[derive(Debug, Serialize)]
struct StartImportResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    project_id: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct JobListResponse {
    jobs: Vec<ImportJob>,
}

pub fn make_routes() -> Router<ServerState> {
    Router::new()
        .route("/start", post(start_import))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs", get(list_jobs))
}

/// POST /api/import/start - validate configuration, create the job and
/// return its id; the import itself runs in the background.
async fn start_import(
    _auth: ApiAuth,
    State(service): State<GuardedImportService>,
    Json(body): Json<StartImportBody>,
) -> impl IntoResponse {
    match service.start_remote_import(&body.project_id).await {
        Ok(job_id) => {
            info!("started import job {} for project {}", job_id, body.project_id);
            (StatusCode::ACCEPTED, Json(StartImportResponse { job_id })).into_response()
        }
        Err(ImportError::Configuration(message)) => {
            warn!(
                "refusing import for project {}: {}",
                body.project_id, message
            );
            (StatusCode::CONFLICT, ErrorResponse::new(message)).into_response()
        }
        Err(e) => {
            warn!("failed to start import for project {}: {:#}", body.project_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()),
            )
                .into_response()
        }
    }
}

/// GET /api/import/jobs/{id}
async fn get_job(
    _auth: ApiAuth,
    State(jobs): State<GuardedImportJobStore>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match jobs.get_job(&job_id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("no import job {}", job_id)),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()),
        )
            .into_response(),
    }
}

/// GET /api/import/jobs?project_id= - recent jobs, newest first.
async fn list_jobs(
    _auth: ApiAuth,
    State(jobs): State<GuardedImportJobStore>,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    match jobs.jobs_for_project(&query.project_id, query.limit) {
        Ok(jobs) => Json(JobListResponse { jobs }).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()),
        )
            .into_response(),
    }
}
