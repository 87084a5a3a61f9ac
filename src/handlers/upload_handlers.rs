//! HTTP handlers for upload session operations.
//! Thin JSON adapters; all policy lives in `UploadService`.

use crate::{
    errors::AppError,
    models::{
        part::PartRef,
        session::{SessionView, UploadStatus},
    },
    services::upload_service::{CreatedSession, NewSession, PartAuthorization},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for `PUT /uploads/{id}/parts/{part_number}`.
#[derive(Debug, Deserialize)]
pub struct RegisterPartReq {
    #[serde(alias = "content_identifier")]
    pub etag: String,
    pub size: Option<i64>,
}

/// Request body for `POST /uploads/{id}/complete`.
#[derive(Debug, Deserialize)]
pub struct CompleteUploadReq {
    #[serde(default)]
    pub parts: Vec<PartRef>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CompleteUploadResponse {
    pub location: String,
}

/// Malformed ids can never match a session, so they are reported as unknown.
fn parse_session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::not_found(format!("upload session `{}` not found", raw)))
}

/// Part numbers outside `i32` or non-numeric are malformed input.
fn parse_part_number(raw: &str) -> Result<i32, AppError> {
    raw.parse::<i32>().map_err(|_| {
        AppError::invalid_argument(format!("part_number must be an integer, got `{}`", raw))
    })
}

/// Report rejected request input, unless the session itself is unknown.
async fn reject_input(state: &AppState, id: Uuid, err: AppError) -> AppError {
    match state.uploads.ensure_session(id).await {
        Ok(()) => err,
        Err(e) => state.fail(e),
    }
}

/// POST `/uploads` — open a multipart upload session.
pub async fn create_upload(
    State(state): State<AppState>,
    payload: Result<Json<NewSession>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedSession>), AppError> {
    let Json(req) = payload?;
    let created = state
        .uploads
        .create_session(req)
        .await
        .map_err(|e| state.fail(e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET `/uploads/{id}` — session state plus registered parts.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let id = parse_session_id(&id)?;
    let view = state.uploads.get_status(id).await.map_err(|e| state.fail(e))?;
    Ok(Json(view))
}

/// POST `/uploads/{id}/parts/{part_number}/presign` — presigned PUT URL for one part.
pub async fn presign_part(
    State(state): State<AppState>,
    Path((id, part_number)): Path<(String, String)>,
) -> Result<Json<PartAuthorization>, AppError> {
    let id = parse_session_id(&id)?;
    let part_number = match parse_part_number(&part_number) {
        Ok(n) => n,
        Err(err) => return Err(reject_input(&state, id, err).await),
    };
    let auth = state
        .uploads
        .authorize_part(id, part_number)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(auth))
}

/// PUT `/uploads/{id}/parts/{part_number}` — record a transferred part's ETag.
pub async fn register_part(
    State(state): State<AppState>,
    Path((id, part_number)): Path<(String, String)>,
    payload: Result<Json<RegisterPartReq>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let id = parse_session_id(&id)?;
    let (part_number, req) = match (parse_part_number(&part_number), payload) {
        (Ok(n), Ok(Json(req))) => (n, req),
        (Err(err), _) => return Err(reject_input(&state, id, err).await),
        (_, Err(rejection)) => return Err(reject_input(&state, id, rejection.into()).await),
    };
    state
        .uploads
        .register_part(id, part_number, req.etag, req.size)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(StatusResponse { status: "ok" }))
}

/// POST `/uploads/{id}/complete` — assemble the object from the given parts.
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CompleteUploadReq>, JsonRejection>,
) -> Result<Json<CompleteUploadResponse>, AppError> {
    let id = parse_session_id(&id)?;
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return Err(reject_input(&state, id, rejection.into()).await),
    };
    let location = state
        .uploads
        .finalize(id, req.parts)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(CompleteUploadResponse { location }))
}

/// POST `/uploads/{id}/abort` — abandon the upload.
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let id = parse_session_id(&id)?;
    let status: UploadStatus = state.uploads.abort(id).await.map_err(|e| state.fail(e))?;
    Ok(Json(StatusResponse {
        status: status.as_str(),
    }))
}
