mod commands;
mod queries;
mod types;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::ExamSubmission;
use crate::db::types::SubmissionStatus;
use crate::repositories::store::{StoreError, SubmissionStore};

#[derive(Clone)]
pub(crate) struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn insert_if_absent(&self, submission: &ExamSubmission) -> Result<bool, StoreError> {
        Ok(commands::insert_if_absent(&self.pool, submission).await?)
    }

    async fn find(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<ExamSubmission>, StoreError> {
        Ok(queries::find_by_exam_and_student(&self.pool, exam_id, student_id).await?)
    }

    async fn replace(&self, submission: &ExamSubmission) -> Result<bool, StoreError> {
        Ok(commands::replace_if_version(&self.pool, submission).await?)
    }

    async fn list_by_exam(
        &self,
        exam_id: &str,
        statuses: &[SubmissionStatus],
    ) -> Result<Vec<ExamSubmission>, StoreError> {
        Ok(queries::list_by_exam(&self.pool, exam_id, statuses).await?)
    }

    async fn list_unscored_submitted(
        &self,
        limit: i64,
    ) -> Result<Vec<ExamSubmission>, StoreError> {
        Ok(queries::list_unscored_submitted(&self.pool, limit).await?)
    }

    async fn list_with_pending_judge_runs(
        &self,
        limit: i64,
    ) -> Result<Vec<ExamSubmission>, StoreError> {
        Ok(queries::list_with_pending_judge_runs(&self.pool, limit).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
