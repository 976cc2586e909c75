mod student;
mod trainer;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        // Student endpoints
        .route("/exams/:exam_id/start", post(student::start_exam))
        .route("/exams/:exam_id/answers", post(student::submit_answer))
        .route("/exams/:exam_id/run-code", post(student::run_code))
        .route("/exams/:exam_id/submit", post(student::submit_exam))
        .route("/exams/:exam_id/status", get(student::get_status))
        // Trainer endpoints
        .route("/exams/:exam_id/pending-evaluation", get(trainer::pending_evaluation))
        .route("/exams/:exam_id/students/:student_id", get(trainer::get_submission))
        .route("/exams/:exam_id/students/:student_id/evaluate", post(trainer::evaluate))
}

#[cfg(test)]
mod tests;
