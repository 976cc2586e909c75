use sqlx::PgPool;

use crate::db::models::ExamSubmission;
use crate::db::types::SubmissionStatus;

use super::types::COLUMNS;

pub(crate) async fn find_by_exam_and_student(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamSubmission>, sqlx::Error> {
    sqlx::query_as::<_, ExamSubmission>(&format!(
        "SELECT {COLUMNS} FROM exam_submissions WHERE exam_id = $1 AND student_id = $2"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    statuses: &[SubmissionStatus],
) -> Result<Vec<ExamSubmission>, sqlx::Error> {
    sqlx::query_as::<_, ExamSubmission>(&format!(
        "SELECT {COLUMNS} FROM exam_submissions \
         WHERE exam_id = $1 AND status = ANY($2) \
         ORDER BY submitted_at NULLS LAST, created_at"
    ))
    .bind(exam_id)
    .bind(statuses.to_vec())
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_unscored_submitted(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ExamSubmission>, sqlx::Error> {
    sqlx::query_as::<_, ExamSubmission>(&format!(
        "SELECT {COLUMNS} FROM exam_submissions \
         WHERE status = $1 AND graded_at IS NULL \
         ORDER BY updated_at \
         LIMIT $2"
    ))
    .bind(SubmissionStatus::Submitted)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_with_pending_judge_runs(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ExamSubmission>, sqlx::Error> {
    sqlx::query_as::<_, ExamSubmission>(&format!(
        "SELECT {COLUMNS} FROM exam_submissions \
         WHERE status = ANY($1) \
           AND answers @> '[{{\"judge\": {{\"status\": \"pending\"}}}}]'::jsonb \
         ORDER BY updated_at \
         LIMIT $2"
    ))
    .bind(vec![SubmissionStatus::NotStarted, SubmissionStatus::InProgress])
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}
