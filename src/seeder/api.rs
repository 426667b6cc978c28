use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::github::GitHubClient;
use super::models::{JobStatus, SetupRequest};
use super::orchestrator::Orchestrator;
use crate::errors::SetupError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Used to proxy artifact downloads for completed jobs.
    pub downloader: GitHubClient,
    pub package_path: PathBuf,
}

pub type SharedState = Arc<AppState>;

pub const DEFAULT_JOB_LIST_LIMIT: usize = 20;
const MAX_JOB_LIST_LIMIT: usize = 100;

// ── Response payload types ────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    pub status_url: String,
}

#[derive(Deserialize)]
pub struct JobsQuery {
    pub limit: Option<usize>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<SetupError> for ApiError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::InvalidToken => ApiError::BadRequest(
                "Invalid GitHub token format. Tokens must start with 'ghp_' or \
                 'github_pat_' and be at least 20 characters long."
                    .into(),
            ),
            SetupError::MissingField(field) => {
                ApiError::BadRequest(format!("Missing required field: {}", field))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/download-package", get(download_package))
        .route("/api/setup-repository", post(setup_repository))
        .route("/api/status/{job_id}", get(get_job_status))
        .route("/api/download/{job_id}/{file_name}", get(download_artifact))
        .route("/api/jobs", get(list_jobs))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn attachment(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", file_name.replace('"', ""))
}

fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("Job {} not found", raw)))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

async fn download_package(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let path = &state.package_path;
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Package file not found".into()));
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to open package: {}", e))),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read package metadata: {}", e)))?
        .len();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "package".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CONTENT_DISPOSITION, attachment(&file_name)),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn setup_repository(
    State(state): State<SharedState>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    })?;
    let job = state.orchestrator.launch(req)?;
    let body = SetupAccepted {
        job_id: job.id,
        status: job.status,
        message: "Repository setup started".to_string(),
        status_url: format!("/api/status/{}", job.id),
    };
    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn get_job_status(
    State(state): State<SharedState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&job_id)?;
    match state.orchestrator.store().get(id) {
        Some(job) => Ok(Json(job)),
        None => Err(ApiError::NotFound(format!("Job {} not found", job_id))),
    }
}

async fn download_artifact(
    State(state): State<SharedState>,
    Path((job_id, file_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
        return Err(ApiError::BadRequest("Invalid file name".into()));
    }
    let id = parse_job_id(&job_id)?;
    let job = state
        .orchestrator
        .store()
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))?;
    let url = match (job.status, job.download_url) {
        (JobStatus::Completed, Some(url)) => url,
        _ => {
            return Err(ApiError::NotFound(format!(
                "No download available for job {}",
                job_id
            )));
        }
    };

    let upstream = state.downloader.download(&url).await.map_err(|e| {
        tracing::warn!(job_id = %id, url = %url, error = %e, "Artifact download failed");
        ApiError::Upstream(format!("Failed to fetch artifact: {}", e))
    })?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_or_octet_stream()
                .to_string()
        });

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, attachment(&file_name)),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response())
}

async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<JobsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_JOB_LIST_LIMIT)
        .min(MAX_JOB_LIST_LIMIT);
    Json(state.orchestrator.store().list(limit))
}

// ── Tests ─────────────────────────────────────────────────────────────
