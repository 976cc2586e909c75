use crate::db::models::ExamSubmission;

/// `ON CONFLICT DO NOTHING` on the (exam_id, student_id) key: the losing writer of a
/// concurrent start sees `false` and reads the winner's row instead.
pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    submission: &ExamSubmission,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_submissions (
            id, exam_id, student_id, status, started_at, answers, total_marks_max,
            cheating_logs, version, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
        ON CONFLICT (exam_id, student_id) DO NOTHING",
    )
    .bind(&submission.id)
    .bind(&submission.exam_id)
    .bind(&submission.student_id)
    .bind(submission.status)
    .bind(submission.started_at)
    .bind(&submission.answers)
    .bind(submission.total_marks_max)
    .bind(&submission.cheating_logs)
    .bind(submission.version)
    .bind(submission.created_at)
    .bind(submission.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn replace_if_version(
    executor: impl sqlx::PgExecutor<'_>,
    submission: &ExamSubmission,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_submissions
         SET status = $1,
             started_at = $2,
             submitted_at = $3,
             graded_at = $4,
             evaluated_at = $5,
             evaluated_by = $6,
             answers = $7,
             violation_count = $8,
             cheating_detected = $9,
             cheating_logs = $10,
             submission_reason = $11,
             total_marks_obtained = $12,
             total_marks_max = $13,
             percentage_score = $14,
             grade = $15,
             qualified = $16,
             time_spent = $17,
             questions_answered = $18,
             progress_percentage = $19,
             last_sequence = $20,
             final_payload_hash = $21,
             updated_at = $22,
             version = version + 1
         WHERE id = $23 AND version = $24",
    )
    .bind(submission.status)
    .bind(submission.started_at)
    .bind(submission.submitted_at)
    .bind(submission.graded_at)
    .bind(submission.evaluated_at)
    .bind(&submission.evaluated_by)
    .bind(&submission.answers)
    .bind(submission.violation_count)
    .bind(submission.cheating_detected)
    .bind(&submission.cheating_logs)
    .bind(submission.submission_reason)
    .bind(submission.total_marks_obtained)
    .bind(submission.total_marks_max)
    .bind(submission.percentage_score)
    .bind(submission.grade)
    .bind(submission.qualified)
    .bind(submission.time_spent)
    .bind(submission.questions_answered)
    .bind(submission.progress_percentage)
    .bind(submission.last_sequence)
    .bind(&submission.final_payload_hash)
    .bind(submission.updated_at)
    .bind(&submission.id)
    .bind(submission.version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
