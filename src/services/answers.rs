use serde::Serialize;
use time::OffsetDateTime;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerEntry, ExamSubmission, Question, QuestionKind, TestCaseResult};
use crate::db::types::{JudgeStatus, SubmissionReason, SubmissionStatus};
use crate::services::attempts::{load_exam, mutate, IfMissing, Mutation};
use crate::services::code_runs::{
    accepts_run, apply_run, dispatch, execute_question, new_run_token, pending_run, DispatchedRun,
};
use crate::services::errors::ExamError;
use crate::services::grading::apply_progress;
use crate::services::scoring::{validate_answer, AnswerPayload, RawAnswer};
use crate::services::violations::{auto_submit_reason, lock_attempt, merge_report, IntegrityReport};

#[derive(Debug, Clone, Default)]
pub(crate) struct AnswerSubmission {
    pub(crate) question_id: String,
    pub(crate) answer: RawAnswer,
    pub(crate) time_spent: i64,
    pub(crate) integrity: IntegrityReport,
    /// Client-side counter; a value not above the stored one marks a replayed request.
    pub(crate) sequence: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoreResult {
    pub(crate) question_id: String,
    pub(crate) accepted: bool,
    pub(crate) answered: bool,
    pub(crate) is_correct: bool,
    pub(crate) marks_obtained: f64,
    pub(crate) marks_max: f64,
    pub(crate) judge_status: Option<JudgeStatus>,
    pub(crate) status: SubmissionStatus,
    pub(crate) submission_reason: Option<SubmissionReason>,
    pub(crate) auto_submitted: bool,
    pub(crate) violation_count: i32,
    pub(crate) questions_answered: i32,
    pub(crate) progress_percentage: f64,
}

impl ScoreResult {
    fn from_entry(
        submission: &ExamSubmission,
        entry: Option<&AnswerEntry>,
        question: &Question,
        accepted: bool,
        auto_submitted: bool,
    ) -> Self {
        Self {
            question_id: question.id.clone(),
            accepted,
            answered: entry.is_some_and(|entry| entry.answered),
            is_correct: entry.is_some_and(|entry| entry.is_correct),
            marks_obtained: entry.map(|entry| entry.marks_obtained).unwrap_or(0.0),
            marks_max: question.marks,
            judge_status: entry.and_then(|entry| entry.judge.as_ref()).map(|run| run.status),
            status: submission.status,
            submission_reason: submission.submission_reason,
            auto_submitted,
            violation_count: submission.violation_count,
            questions_answered: submission.questions_answered,
            progress_percentage: submission.progress_percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunCodeResult {
    pub(crate) question_id: String,
    pub(crate) judge_status: JudgeStatus,
    pub(crate) error: Option<String>,
    pub(crate) test_cases_passed: u32,
    pub(crate) test_cases_failed: u32,
    pub(crate) results: Vec<TestCaseResult>,
    pub(crate) marks_obtained: f64,
    pub(crate) marks_max: f64,
}

fn answered_entry(
    question: &Question,
    payload: &AnswerPayload,
    previous: Option<&AnswerEntry>,
    now: OffsetDateTime,
) -> AnswerEntry {
    let mut entry = AnswerEntry::unanswered(question);
    entry.answered = true;
    entry.answered_at = Some(now);
    entry.time_spent = previous.map(|previous| previous.time_spent).unwrap_or(0);

    match payload {
        AnswerPayload::Mcq { selected_option, is_correct, marks } => {
            entry.selected_option = Some(*selected_option);
            entry.is_correct = *is_correct;
            entry.marks_obtained = *marks;
        }
        AnswerPayload::Theory { text_answer } => {
            entry.text_answer = Some(text_answer.clone());
        }
        AnswerPayload::Coding { code, language } => {
            entry.code = Some(code.clone());
            entry.language = Some(language.clone());
            entry.last_run_code = previous.and_then(|previous| previous.last_run_code.clone());
            entry.judge = Some(pending_run(new_run_token()));
        }
    }

    entry
}

fn is_replay(submission: &ExamSubmission, sequence: Option<i64>) -> bool {
    match (sequence, submission.last_sequence) {
        (Some(incoming), Some(stored)) => incoming <= stored,
        _ => false,
    }
}

/// Stores one answer, replacing any earlier answer to the same question.
pub(crate) async fn submit_answer(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    input: AnswerSubmission,
) -> Result<ScoreResult, ExamError> {
    let exam = load_exam(state.catalog(), exam_id).await?;
    let question = exam
        .question(&input.question_id)
        .ok_or_else(|| {
            ExamError::validation(format!("Question {} is not part of this exam", input.question_id))
        })?
        .clone();
    if input.time_spent < 0 {
        return Err(ExamError::validation("time_spent must be non-negative"));
    }
    let payload = validate_answer(&question, &input.answer, state.judge().as_ref())?;
    let violation_limit = state.settings().exam().violation_limit;

    let (submission, (result, auto_reason)) = mutate(
        state.submissions(),
        exam_id,
        student_id,
        IfMissing::Create(&exam),
        |submission| {
            if !submission.status.is_modifiable() {
                let entry = submission.answer(&question.id);
                let result = ScoreResult::from_entry(submission, entry, &question, false, false);
                return Ok(Mutation::Skip((result, None)));
            }

            let now = OffsetDateTime::now_utc();
            let mut entry = answered_entry(&question, &payload, submission.answer(&question.id), now);
            if !is_replay(submission, input.sequence) {
                entry.time_spent = entry.time_spent.saturating_add(input.time_spent);
                submission.time_spent = submission.time_spent.saturating_add(input.time_spent);
                merge_report(submission, &input.integrity, now);
                if input.sequence.is_some() {
                    submission.last_sequence = input.sequence;
                }
            }
            submission.upsert_answer(entry);
            submission.status = SubmissionStatus::InProgress;
            apply_progress(submission, &exam);

            let auto_reason = auto_submit_reason(submission, violation_limit);
            if let Some(reason) = auto_reason {
                lock_attempt(submission, reason, primitive_now_utc());
            }

            let entry = submission.answer(&question.id);
            let result =
                ScoreResult::from_entry(submission, entry, &question, true, auto_reason.is_some());
            Ok(Mutation::Write((result, auto_reason)))
        },
    )
    .await?;

    if !result.accepted {
        tracing::info!(
            exam_id,
            student_id,
            question_id = %question.id,
            status = submission.status.as_str(),
            "Answer ignored for a closed attempt"
        );
        return Ok(result);
    }

    metrics::counter!("exam_answers_total", "question_type" => question.question_type().as_str())
        .increment(1);

    if let (QuestionKind::Coding(coding), AnswerPayload::Coding { code, language }) =
        (&question.kind, &payload)
    {
        let run_token = submission
            .answer(&question.id)
            .and_then(|entry| entry.judge.as_ref())
            .map(|run| run.run_token.clone());
        if let Some(run_token) = run_token {
            dispatch(
                state,
                DispatchedRun {
                    exam_id: exam_id.to_string(),
                    student_id: student_id.to_string(),
                    submission_id: submission.id.clone(),
                    question_id: question.id.clone(),
                    question: coding.clone(),
                    marks_max: question.marks,
                    code: code.clone(),
                    language: language.clone(),
                    run_token,
                },
            );
        }
    }

    if let Some(reason) = auto_reason {
        metrics::counter!("exam_auto_submissions_total").increment(1);
        tracing::warn!(
            exam_id,
            student_id,
            violation_count = submission.violation_count,
            reason = ?reason,
            "Attempt auto-submitted by the violation monitor"
        );
    }

    tracing::info!(
        exam_id,
        student_id,
        question_id = %question.id,
        question_type = question.question_type().as_str(),
        marks_obtained = result.marks_obtained,
        "Answer recorded"
    );

    Ok(result)
}

/// Executes the student's code now and reports per-case results. The run also becomes the
/// stored answer for the question.
pub(crate) async fn run_code(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    question_id: &str,
    answer: RawAnswer,
) -> Result<RunCodeResult, ExamError> {
    let exam = load_exam(state.catalog(), exam_id).await?;
    let question = exam
        .question(question_id)
        .ok_or_else(|| {
            ExamError::validation(format!("Question {question_id} is not part of this exam"))
        })?
        .clone();
    let QuestionKind::Coding(coding) = &question.kind else {
        return Err(ExamError::validation("Only coding questions can be run"));
    };
    let AnswerPayload::Coding { code, language } =
        validate_answer(&question, &answer, state.judge().as_ref())?
    else {
        return Err(ExamError::validation("Only coding questions can be run"));
    };

    let exam_settings = state.settings().exam();
    let rate_key = format!("run-code:{exam_id}:{student_id}");
    match state
        .redis()
        .rate_limit(&rate_key, exam_settings.run_code_limit, exam_settings.run_code_window_seconds)
        .await
    {
        Ok(true) => {}
        Ok(false) => return Err(ExamError::RateLimited),
        Err(err) => {
            tracing::warn!(exam_id, student_id, error = %err, "Run-code rate limit check failed");
        }
    }

    let payload = AnswerPayload::Coding { code: code.clone(), language: language.clone() };
    let (submission, run_token) = mutate(
        state.submissions(),
        exam_id,
        student_id,
        IfMissing::Create(&exam),
        |submission| {
            if !submission.status.is_modifiable() {
                return Err(ExamError::Conflict("Exam has already been submitted".to_string()));
            }
            let mut entry = answered_entry(
                &question,
                &payload,
                submission.answer(&question.id),
                OffsetDateTime::now_utc(),
            );
            entry.last_run_code = Some(code.clone());
            let run_token =
                entry.judge.as_ref().map(|run| run.run_token.clone()).unwrap_or_default();
            submission.upsert_answer(entry);
            submission.status = SubmissionStatus::InProgress;
            apply_progress(submission, &exam);
            Ok(Mutation::Write(run_token))
        },
    )
    .await?;
    state.jobs().cancel(&submission.id, &question.id);

    let run = execute_question(
        state.judge(),
        state.limits(),
        coding,
        question.marks,
        &code,
        &language,
    )
    .await;

    mutate(state.submissions(), exam_id, student_id, IfMissing::NotFound, |submission| {
        let scored = submission.is_scored();
        let status = submission.status;
        match submission.answer_mut(&question.id) {
            Some(entry) if accepts_run(status, scored, entry, &run_token) => {
                apply_run(entry, &run, &run_token);
                Ok(Mutation::Write(()))
            }
            _ => Ok(Mutation::Skip(())),
        }
    })
    .await?;

    tracing::info!(
        exam_id,
        student_id,
        question_id,
        judge_status = ?run.status,
        passed = run.passed,
        failed = run.failed,
        "Code run finished"
    );

    Ok(RunCodeResult {
        question_id: question.id.clone(),
        judge_status: run.status,
        error: run.error,
        test_cases_passed: run.passed,
        test_cases_failed: run.failed,
        results: run.results,
        marks_obtained: run.marks,
        marks_max: question.marks,
    })
}
