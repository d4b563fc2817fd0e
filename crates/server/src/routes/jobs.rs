use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use orchestrator::JobDetails;
use serde::{Deserialize, Serialize};
use stackforge_core::{Job, JobStatus};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct OrchestrateRequest {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct OrchestrateResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

pub async fn orchestrate(
    State(state): State<AppState>,
    payload: Result<Json<OrchestrateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrchestrateResponse>), AppError> {
    let Json(request) = payload?;
    let description = request.description.unwrap_or_default();
    if description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "A non-empty \"description\" field is required.".to_string(),
        ));
    }

    let job = state.engine.submit(&description).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OrchestrateResponse {
            job_id: job.id,
            status: job.status,
            message: "Orchestration request accepted.".to_string(),
        }),
    ))
}

pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<JobListResponse>, AppError> {
    let jobs = state.engine.list_jobs().await?;
    Ok(Json(JobListResponse { jobs }))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobDetails>, AppError> {
    state
        .engine
        .get_job_details(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found.", job_id)))
}
