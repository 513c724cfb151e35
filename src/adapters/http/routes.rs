use super::AppState;
use crate::application::dispatch::DispatchError;
use crate::application::submit::SubmitError;
use crate::domain::jobs::{RequestProgress, WorkerHeartbeat};
use crate::domain::requests::{EncodeJobRequest, JobRequest, MuxJobRequest};
use crate::ports::repository::{JobRepository, RepositoryError};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub correlation_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub paused: u64,
}

#[derive(Debug, Deserialize)]
pub struct NextJobQuery {
    pub machine: String,
}

#[derive(Debug, Deserialize)]
pub struct FailReport {
    pub reason: String,
}

pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<JobRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    let correlation_id = state.service.submit(body).await.map_err(submit_error)?;
    Ok(Json(SubmitResponse { correlation_id }))
}

pub async fn submit_mux(
    State(state): State<AppState>,
    Json(body): Json<MuxJobRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    let correlation_id = state.service.submit_mux(body).await.map_err(submit_error)?;
    Ok(Json(SubmitResponse { correlation_id }))
}

pub async fn submit_encode(
    State(state): State<AppState>,
    Json(body): Json<EncodeJobRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    let correlation_id = state
        .service
        .submit_encode(body)
        .await
        .map_err(submit_error)?;
    Ok(Json(SubmitResponse { correlation_id }))
}

pub async fn request_progress(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> Result<Json<RequestProgress>, (StatusCode, String)> {
    let progress = state
        .dispatcher
        .progress(correlation_id)
        .await
        .map_err(dispatch_error)?;

    match progress {
        Some(progress) => Ok(Json(progress)),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("unknown correlation id {}", correlation_id),
        )),
    }
}

pub async fn pause_request(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> Result<Json<PauseResponse>, (StatusCode, String)> {
    let paused = state
        .dispatcher
        .pause(correlation_id)
        .await
        .map_err(dispatch_error)?;
    Ok(Json(PauseResponse { paused }))
}

pub async fn next_job(
    State(state): State<AppState>,
    Query(query): Query<NextJobQuery>,
) -> Result<Response, (StatusCode, String)> {
    let job = state
        .dispatcher
        .next_job(&query.machine)
        .await
        .map_err(dispatch_error)?;

    Ok(match job {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn job_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.dispatcher.heartbeat(id).await.map_err(dispatch_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn job_done(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.dispatcher.complete(id).await.map_err(dispatch_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn job_failed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(report): Json<FailReport>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .dispatcher
        .fail(id, &report.reason)
        .await
        .map_err(dispatch_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn workers(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkerHeartbeat>>, (StatusCode, String)> {
    let workers = state.repo.list_workers().await.map_err(repository_error)?;
    Ok(Json(workers))
}

fn submit_error(err: SubmitError) -> (StatusCode, String) {
    let status = match &err {
        SubmitError::BadRequest(_) => StatusCode::BAD_REQUEST,
        SubmitError::SourceNotFound(_) => StatusCode::NOT_FOUND,
        SubmitError::DestinationInvalid(_) => StatusCode::NOT_FOUND,
        SubmitError::ProbeFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SubmitError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn dispatch_error(err: DispatchError) -> (StatusCode, String) {
    let status = match &err {
        DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DispatchError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn repository_error(err: RepositoryError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
