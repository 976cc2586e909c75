use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTrainer;
use crate::core::state::AppState;
use crate::schemas::submission::{
    Audience, EvaluateTheoryRequest, PendingEvaluationResponse, SubmissionResponse,
};
use crate::services::{attempts, evaluation};

pub(super) async fn get_submission(
    Path((exam_id, student_id)): Path<(String, String)>,
    CurrentTrainer(_trainer): CurrentTrainer,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    attempts::load_exam(state.catalog(), &exam_id).await?;
    let submission = attempts::find_attempt(state.submissions(), &exam_id, &student_id).await?;

    Ok(Json(SubmissionResponse::new(&submission, Audience::Trainer)))
}

pub(super) async fn evaluate(
    Path((exam_id, student_id)): Path<(String, String)>,
    CurrentTrainer(trainer): CurrentTrainer,
    State(state): State<AppState>,
    Json(payload): Json<EvaluateTheoryRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission =
        evaluation::evaluate_theory(&state, &exam_id, &student_id, &trainer.id, payload.marks)
            .await?;

    Ok(Json(SubmissionResponse::new(&submission, Audience::Trainer)))
}

pub(super) async fn pending_evaluation(
    Path(exam_id): Path<String>,
    CurrentTrainer(_trainer): CurrentTrainer,
    State(state): State<AppState>,
) -> Result<Json<PendingEvaluationResponse>, ApiError> {
    let submissions = evaluation::pending_evaluation(&state, &exam_id).await?;

    Ok(Json(PendingEvaluationResponse {
        exam_id,
        submissions: submissions
            .iter()
            .map(|submission| SubmissionResponse::new(submission, Audience::Trainer))
            .collect(),
    }))
}
