use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::services::answers::{self, ScoreResult};
use crate::services::{attempts, finalize};
use crate::schemas::submission::{
    Audience, RunCodeRequest, RunCodeResponse, SubmissionResponse, SubmitAnswerRequest,
    SubmitExamRequest,
};

pub(super) async fn start_exam(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let exam = attempts::load_exam(state.catalog(), &exam_id).await?;
    let submission = attempts::start_or_resume(state.submissions(), &exam, &user.id).await?;

    Ok(Json(SubmissionResponse::new(&submission, Audience::Student)))
}

pub(super) async fn submit_answer(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<ScoreResult>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let result = answers::submit_answer(&state, &exam_id, &user.id, payload.into()).await?;
    Ok(Json(result))
}

pub(super) async fn run_code(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RunCodeRequest>,
) -> Result<Json<RunCodeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (question_id, answer) = payload.into_answer();
    let result = answers::run_code(&state, &exam_id, &user.id, &question_id, answer).await?;
    Ok(Json(result.into()))
}

pub(super) async fn submit_exam(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<SubmitExamRequest>>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let submission = finalize::submit_exam(&state, &exam_id, &user.id, payload.into()).await?;
    Ok(Json(SubmissionResponse::new(&submission, Audience::Student)))
}

pub(super) async fn get_status(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    attempts::load_exam(state.catalog(), &exam_id).await?;
    let submission = attempts::find_attempt(state.submissions(), &exam_id, &user.id).await?;

    Ok(Json(SubmissionResponse::new(&submission, Audience::Student)))
}
