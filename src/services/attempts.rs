use sqlx::types::Json;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerEntry, Exam, ExamSubmission};
use crate::db::types::SubmissionStatus;
use crate::repositories::store::{ExamCatalog, StoreError, SubmissionStore};
use crate::services::errors::ExamError;

const MAX_WRITE_ATTEMPTS: usize = 8;

/// What a read-modify-write closure decided to do with the loaded document.
pub(crate) enum Mutation<T> {
    Write(T),
    Skip(T),
}

/// How `mutate` treats an attempt that does not exist yet.
#[derive(Clone, Copy)]
pub(crate) enum IfMissing<'a> {
    Create(&'a Exam),
    NotFound,
}

pub(crate) async fn load_exam(catalog: &dyn ExamCatalog, exam_id: &str) -> Result<Exam, ExamError> {
    catalog
        .find_exam(exam_id)
        .await?
        .ok_or_else(|| ExamError::NotFound(format!("Exam {exam_id} not found")))
}

pub(crate) async fn find_attempt(
    store: &dyn SubmissionStore,
    exam_id: &str,
    student_id: &str,
) -> Result<ExamSubmission, ExamError> {
    store
        .find(exam_id, student_id)
        .await?
        .ok_or_else(|| ExamError::NotFound("Submission not found".to_string()))
}

pub(crate) fn fresh_submission(exam: &Exam, student_id: &str) -> ExamSubmission {
    let now = primitive_now_utc();
    ExamSubmission {
        id: Uuid::new_v4().to_string(),
        exam_id: exam.id.clone(),
        student_id: student_id.to_string(),
        status: SubmissionStatus::InProgress,
        started_at: Some(now),
        submitted_at: None,
        graded_at: None,
        evaluated_at: None,
        evaluated_by: None,
        answers: Json(exam.questions.iter().map(AnswerEntry::unanswered).collect()),
        violation_count: 0,
        cheating_detected: false,
        cheating_logs: Json(Vec::new()),
        submission_reason: None,
        total_marks_obtained: 0.0,
        total_marks_max: exam.max_marks(),
        percentage_score: 0.0,
        grade: None,
        qualified: false,
        time_spent: 0,
        questions_answered: 0,
        progress_percentage: 0.0,
        last_sequence: None,
        final_payload_hash: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Returns the student's attempt, creating it on first contact. Concurrent callers all
/// observe the single document that won the insert.
pub(crate) async fn start_or_resume(
    store: &dyn SubmissionStore,
    exam: &Exam,
    student_id: &str,
) -> Result<ExamSubmission, ExamError> {
    if let Some(existing) = store.find(&exam.id, student_id).await? {
        return Ok(existing);
    }

    let created = store.insert_if_absent(&fresh_submission(exam, student_id)).await?;
    if created {
        tracing::info!(exam_id = %exam.id, student_id, "Exam attempt started");
    }

    store.find(&exam.id, student_id).await?.ok_or_else(|| {
        ExamError::Store(StoreError::Unavailable(format!(
            "attempt for exam {} vanished after insert",
            exam.id
        )))
    })
}

/// Read-modify-write of one attempt guarded by its version. `apply` runs against a fresh
/// copy on every retry, so it must derive everything from the document it is given.
pub(crate) async fn mutate<T, F>(
    store: &dyn SubmissionStore,
    exam_id: &str,
    student_id: &str,
    if_missing: IfMissing<'_>,
    mut apply: F,
) -> Result<(ExamSubmission, T), ExamError>
where
    F: FnMut(&mut ExamSubmission) -> Result<Mutation<T>, ExamError> + Send,
    T: Send,
{
    let mut submission_id = String::new();

    for _ in 0..MAX_WRITE_ATTEMPTS {
        let current = match if_missing {
            IfMissing::Create(exam) => start_or_resume(store, exam, student_id).await?,
            IfMissing::NotFound => find_attempt(store, exam_id, student_id).await?,
        };
        submission_id.clone_from(&current.id);

        let mut draft = current.clone();
        match apply(&mut draft)? {
            Mutation::Skip(value) => return Ok((current, value)),
            Mutation::Write(value) => {
                draft.updated_at = primitive_now_utc();
                if store.replace(&draft).await? {
                    draft.version += 1;
                    return Ok((draft, value));
                }
                metrics::counter!("exam_write_conflicts_total").increment(1);
                tracing::debug!(exam_id, student_id, "Attempt changed concurrently, retrying");
            }
        }
    }

    Err(ExamError::Contention { submission_id })
}
