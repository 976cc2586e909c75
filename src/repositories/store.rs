use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{Exam, ExamSubmission};
use crate::db::types::SubmissionStatus;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to exam definitions.
#[async_trait]
pub(crate) trait ExamCatalog: Send + Sync {
    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError>;
}

/// Durable storage of attempt documents, one per (exam, student).
///
/// Writes are whole-document replaces guarded by `version`; callers that lose the
/// race reload and retry.
#[async_trait]
pub(crate) trait SubmissionStore: Send + Sync {
    /// Inserts unless a document for the same (exam, student) exists. Returns whether a row
    /// was created.
    async fn insert_if_absent(&self, submission: &ExamSubmission) -> Result<bool, StoreError>;

    async fn find(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<ExamSubmission>, StoreError>;

    /// Replaces the stored document when its version still equals `submission.version`,
    /// bumping the version. Returns false on a version mismatch.
    async fn replace(&self, submission: &ExamSubmission) -> Result<bool, StoreError>;

    async fn list_by_exam(
        &self,
        exam_id: &str,
        statuses: &[SubmissionStatus],
    ) -> Result<Vec<ExamSubmission>, StoreError>;

    /// Attempts locked by the violation monitor that nobody has scored yet.
    async fn list_unscored_submitted(&self, limit: i64)
        -> Result<Vec<ExamSubmission>, StoreError>;

    /// Modifiable attempts holding at least one coding answer whose judge run is pending.
    async fn list_with_pending_judge_runs(
        &self,
        limit: i64,
    ) -> Result<Vec<ExamSubmission>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Course service hook: a finished exam unlocks the next module regardless of the grade.
#[async_trait]
pub(crate) trait CourseProgress: Send + Sync {
    async fn mark_module_complete(
        &self,
        student_id: &str,
        course_id: &str,
        week_number: i32,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait ReexamRequests: Send + Sync {
    /// Closes an approved re-exam request for the pair, if one exists.
    async fn complete_if_approved(&self, student_id: &str, exam_id: &str)
        -> Result<bool, StoreError>;
}
