use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::repositories::store::{CourseProgress, ReexamRequests, StoreError};

#[derive(Clone)]
pub(crate) struct PgCourseProgress {
    pool: PgPool,
}

impl PgCourseProgress {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseProgress for PgCourseProgress {
    async fn mark_module_complete(
        &self,
        student_id: &str,
        course_id: &str,
        week_number: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO module_completions (student_id, course_id, week_number, completed_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (student_id, course_id, week_number) DO NOTHING",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(week_number)
        .bind(primitive_now_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct PgReexamRequests {
    pool: PgPool,
}

impl PgReexamRequests {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReexamRequests for PgReexamRequests {
    async fn complete_if_approved(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE reexam_requests
             SET status = 'completed', completed_at = $3
             WHERE student_id = $1 AND exam_id = $2 AND status = 'approved'",
        )
        .bind(student_id)
        .bind(exam_id)
        .bind(primitive_now_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
