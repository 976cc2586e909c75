use std::collections::HashMap;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerEntry, Exam, ExamSubmission, QuestionKind};
use crate::db::types::SubmissionStatus;
use crate::services::attempts::{load_exam, mutate, IfMissing, Mutation};
use crate::services::errors::ExamError;
use crate::services::grading::{apply_totals, round2};

fn validate_marks(exam: &Exam, marks: &HashMap<String, f64>) -> Result<(), ExamError> {
    if marks.is_empty() {
        return Err(ExamError::validation("marks must not be empty"));
    }

    for (question_id, awarded) in marks {
        let question = exam.question(question_id).ok_or_else(|| {
            ExamError::validation(format!("Question {question_id} is not part of this exam"))
        })?;
        if !matches!(question.kind, QuestionKind::Theory) {
            return Err(ExamError::validation(format!(
                "Question {question_id} is not a theory question"
            )));
        }
        if !awarded.is_finite() || *awarded < 0.0 || *awarded > question.marks {
            return Err(ExamError::validation(format!(
                "Marks for {question_id} must be between 0 and {}",
                question.marks
            )));
        }
    }

    Ok(())
}

/// Trainer scoring of theory answers. Totals and grade are recomputed from every entry.
pub(crate) async fn evaluate_theory(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    trainer_id: &str,
    marks: HashMap<String, f64>,
) -> Result<ExamSubmission, ExamError> {
    let exam = load_exam(state.catalog(), exam_id).await?;
    validate_marks(&exam, &marks)?;

    let (evaluated, ()) = mutate(
        state.submissions(),
        exam_id,
        student_id,
        IfMissing::NotFound,
        |attempt| {
            if !attempt.is_scored() {
                return Err(ExamError::Conflict(
                    "Submission has not been scored yet".to_string(),
                ));
            }

            for (question_id, awarded) in &marks {
                let Some(question) = exam.question(question_id) else {
                    continue;
                };
                if attempt.answer(question_id).is_none() {
                    attempt.upsert_answer(AnswerEntry::unanswered(question));
                }
                if let Some(entry) = attempt.answer_mut(question_id) {
                    entry.marks_obtained = round2(*awarded);
                    entry.marks_max = question.marks;
                    entry.is_correct = *awarded >= question.marks;
                }
            }

            apply_totals(attempt, &exam);
            attempt.status = SubmissionStatus::Evaluated;
            attempt.evaluated_at = Some(primitive_now_utc());
            attempt.evaluated_by = Some(trainer_id.to_string());
            Ok(Mutation::Write(()))
        },
    )
    .await?;

    tracing::info!(
        exam_id,
        student_id,
        trainer_id,
        percentage = evaluated.percentage_score,
        qualified = evaluated.qualified,
        "Theory answers evaluated"
    );

    Ok(evaluated)
}

/// Scored attempts of the exam still waiting for a trainer.
pub(crate) async fn pending_evaluation(
    state: &AppState,
    exam_id: &str,
) -> Result<Vec<ExamSubmission>, ExamError> {
    let exam = load_exam(state.catalog(), exam_id).await?;
    if !exam.has_theory() {
        return Ok(Vec::new());
    }

    let submissions =
        state.submissions().list_by_exam(exam_id, &[SubmissionStatus::Submitted]).await?;
    Ok(submissions.into_iter().filter(ExamSubmission::is_scored).collect())
}
