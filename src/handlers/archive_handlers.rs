//! HTTP handlers for the archive vault: inventory, jobs, and restores.

use crate::{
    errors::AppError,
    services::recovery::{ArchiveRecovery, RecoveryState},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
}

fn recovery(state: &AppState) -> Result<&ArchiveRecovery, AppError> {
    state.recovery.as_ref().ok_or_else(|| {
        AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "archiving is disabled: no vault configured",
        )
    })
}

/// `GET /archive/inventory`: start an inventory-retrieval job.
pub async fn start_inventory(State(state): State<AppState>) -> Result<Response, AppError> {
    let job_id = recovery(&state)?.start_inventory().await?;
    info!("inventory job {} initiated", job_id);
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })).into_response())
}

/// `GET /archive/jobs`
pub async fn list_jobs(State(state): State<AppState>) -> Result<Response, AppError> {
    let jobs = recovery(&state)?.list_jobs().await?;
    Ok(Json(jobs).into_response())
}

/// `GET /archive/inventory/{job_id}`: output of a finished inventory job.
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let report = recovery(&state)?.inventory(&job_id).await?;
    Ok(Json(report).into_response())
}

/// `POST /archive/retrievals/{archive_id}`: start an archive-retrieval job.
pub async fn start_retrieval(
    State(state): State<AppState>,
    Path(archive_id): Path<String>,
) -> Result<Response, AppError> {
    match recovery(&state)?.initiate(&archive_id).await {
        RecoveryState::JobInitiated { job_id } => {
            Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })).into_response())
        }
        RecoveryState::Failed { failure, .. } => Err(AppError::from_failure(&failure)),
        other => Err(AppError::internal(format!(
            "unexpected recovery state `{}`",
            other.name()
        ))),
    }
}

/// `POST /archive/restore/{job_id}`: drive recovery from a retrieval job.
pub async fn restore_archive(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let recovery = recovery(&state)?;
    match recovery.drive(RecoveryState::resume(&job_id)).await {
        RecoveryState::Restored(outcome) => {
            let mut response = (StatusCode::CREATED, Json(&outcome)).into_response();
            if let Some(value) = outcome
                .location()
                .and_then(|location| HeaderValue::from_str(location).ok())
            {
                response.headers_mut().insert(header::LOCATION, value);
            }
            Ok(response)
        }
        RecoveryState::JobPending { job_id } => Err(AppError::new(
            StatusCode::CONFLICT,
            format!("job {} has not completed yet", job_id),
        )),
        RecoveryState::Failed { failure, .. } => Err(AppError::from_failure(&failure)),
        other => Err(AppError::internal(format!(
            "recovery stopped in state `{}`",
            other.name()
        ))),
    }
}
