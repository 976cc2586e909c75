use std::collections::HashMap;

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::task::JoinSet;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamSubmission, QuestionKind};
use crate::db::types::{Grade, SubmissionReason, SubmissionStatus};
use crate::services::answers::{submit_answer, AnswerSubmission};
use crate::services::attempts::{
    find_attempt, load_exam, mutate, start_or_resume, IfMissing, Mutation,
};
use crate::services::code_runs::{apply_run, execute_question, new_run_token, QuestionRun};
use crate::services::errors::ExamError;
use crate::services::grading::apply_totals;
use crate::services::scoring::{validate_answer, RawAnswer};
use crate::services::violations::{auto_submit_reason, lock_attempt, merge_report, IntegrityReport};

#[derive(Debug, Clone, Default)]
pub(crate) struct FinalAnswer {
    pub(crate) question_id: String,
    pub(crate) answer: RawAnswer,
    pub(crate) time_spent: i64,
}

/// Body of the explicit "submit exam" request: last unsaved answers plus trailing
/// integrity metadata.
#[derive(Debug, Clone, Default)]
pub(crate) struct FinalSubmission {
    pub(crate) answers: Vec<FinalAnswer>,
    pub(crate) integrity: IntegrityReport,
}

#[derive(Serialize)]
struct FingerprintedAnswer<'a> {
    question_id: &'a str,
    answer: &'a RawAnswer,
}

impl FinalSubmission {
    /// Hash of the submitted answers. Timers and integrity metadata are left out, so a
    /// retry that only re-measured them is still the same submission.
    pub(crate) fn fingerprint(&self) -> Result<String, ExamError> {
        let answers: Vec<_> = self
            .answers
            .iter()
            .map(|answer| FingerprintedAnswer {
                question_id: &answer.question_id,
                answer: &answer.answer,
            })
            .collect();
        let canonical = serde_json::to_vec(&answers)
            .map_err(|err| ExamError::validation(format!("Unserializable submission: {err}")))?;
        Ok(hex::encode(Sha256::digest(canonical)))
    }
}

enum Lock {
    Locked,
    AlreadyScored,
}

/// Explicit final submission. Safe to repeat: a scored attempt is returned as stored when
/// the payload is unchanged.
pub(crate) async fn submit_exam(
    state: &AppState,
    exam_id: &str,
    student_id: &str,
    submission: FinalSubmission,
) -> Result<ExamSubmission, ExamError> {
    let exam = load_exam(state.catalog(), exam_id).await?;
    let fingerprint = submission.fingerprint()?;

    let judge = state.judge();
    for answer in &submission.answers {
        let question = exam.question(&answer.question_id).ok_or_else(|| {
            ExamError::validation(format!(
                "Question {} is not part of this exam",
                answer.question_id
            ))
        })?;
        validate_answer(question, &answer.answer, judge.as_ref())?;
    }

    let current = start_or_resume(state.submissions(), &exam, student_id).await?;
    if current.is_scored() {
        return resubmission(state, &exam, student_id, current, &fingerprint).await;
    }

    if current.status.is_modifiable() {
        for answer in &submission.answers {
            submit_answer(
                state,
                exam_id,
                student_id,
                AnswerSubmission {
                    question_id: answer.question_id.clone(),
                    answer: answer.answer.clone(),
                    time_spent: answer.time_spent,
                    ..AnswerSubmission::default()
                },
            )
            .await?;
        }
    }

    let violation_limit = state.settings().exam().violation_limit;
    let (locked, lock) = mutate(
        state.submissions(),
        exam_id,
        student_id,
        IfMissing::Create(&exam),
        |attempt| {
            if attempt.is_scored() {
                return Ok(Mutation::Skip(Lock::AlreadyScored));
            }
            if attempt.status.is_modifiable() {
                merge_report(attempt, &submission.integrity, OffsetDateTime::now_utc());
                let reason =
                    auto_submit_reason(attempt, violation_limit).unwrap_or(SubmissionReason::Manual);
                lock_attempt(attempt, reason, primitive_now_utc());
                attempt.final_payload_hash = Some(fingerprint.clone());
                return Ok(Mutation::Write(Lock::Locked));
            }
            match attempt.final_payload_hash.as_deref() {
                None => {
                    attempt.final_payload_hash = Some(fingerprint.clone());
                    Ok(Mutation::Write(Lock::Locked))
                }
                Some(stored) if stored == fingerprint => Ok(Mutation::Skip(Lock::Locked)),
                Some(_) => Err(conflicting_resubmission()),
            }
        },
    )
    .await?;

    if let Lock::AlreadyScored = lock {
        return resubmission(state, &exam, student_id, locked, &fingerprint).await;
    }

    tracing::info!(
        exam_id,
        student_id,
        submission_id = %locked.id,
        reason = ?locked.submission_reason,
        "Attempt locked for grading"
    );

    complete_grading(state, &exam, student_id).await
}

fn conflicting_resubmission() -> ExamError {
    ExamError::Conflict("Exam was already submitted with different answers".to_string())
}

async fn resubmission(
    state: &AppState,
    exam: &Exam,
    student_id: &str,
    current: ExamSubmission,
    fingerprint: &str,
) -> Result<ExamSubmission, ExamError> {
    match current.final_payload_hash.as_deref() {
        Some(stored) if stored == fingerprint => Ok(current),
        Some(_) => Err(conflicting_resubmission()),
        None => {
            // First explicit submit after the violation monitor closed the attempt.
            let (stored, ()) = mutate(
                state.submissions(),
                &exam.id,
                student_id,
                IfMissing::NotFound,
                |attempt| match attempt.final_payload_hash.as_deref() {
                    None => {
                        attempt.final_payload_hash = Some(fingerprint.to_string());
                        Ok(Mutation::Write(()))
                    }
                    Some(stored) if stored == fingerprint => Ok(Mutation::Skip(())),
                    Some(_) => Err(conflicting_resubmission()),
                },
            )
            .await?;
            Ok(stored)
        }
    }
}

async fn resolve_coding_answers(
    state: &AppState,
    exam: &Exam,
    submission: &ExamSubmission,
) -> HashMap<String, QuestionRun> {
    let mut runs = JoinSet::new();
    for question in &exam.questions {
        let QuestionKind::Coding(coding) = &question.kind else {
            continue;
        };
        let Some(entry) = submission.answer(&question.id).filter(|entry| entry.needs_execution())
        else {
            continue;
        };

        let judge = state.judge();
        let limits = state.limits();
        let coding = coding.clone();
        let question_id = question.id.clone();
        let marks_max = question.marks;
        let code = entry.code.clone().unwrap_or_default();
        let language = entry.language.clone().unwrap_or_else(|| coding.language.clone());
        runs.spawn(async move {
            let run = execute_question(judge, limits, &coding, marks_max, &code, &language).await;
            (question_id, run)
        });
    }

    let mut resolved = HashMap::new();
    while let Some(joined) = runs.join_next().await {
        match joined {
            Ok((question_id, run)) => {
                resolved.insert(question_id, run);
            }
            Err(err) => {
                tracing::error!(submission_id = %submission.id, error = %err, "Fallback judge run failed")
            }
        }
    }
    resolved
}

/// Scores a locked attempt: waits for in-flight judge runs, executes coding answers that
/// never got a result and computes totals and grade. Repeated calls return the stored
/// result.
pub(crate) async fn complete_grading(
    state: &AppState,
    exam: &Exam,
    student_id: &str,
) -> Result<ExamSubmission, ExamError> {
    let current = find_attempt(state.submissions(), &exam.id, student_id).await?;
    if current.is_scored() {
        return Ok(current);
    }
    if current.status.is_modifiable() {
        return Err(ExamError::Conflict("Attempt has not been submitted yet".to_string()));
    }

    state.jobs().wait_for_submission(&current.id).await;
    let current = find_attempt(state.submissions(), &exam.id, student_id).await?;
    if current.is_scored() {
        return Ok(current);
    }

    let resolved = resolve_coding_answers(state, exam, &current).await;

    let (graded, transitioned) = mutate(
        state.submissions(),
        &exam.id,
        student_id,
        IfMissing::NotFound,
        |attempt| {
            if attempt.is_scored() {
                return Ok(Mutation::Skip(false));
            }

            for question in &exam.questions {
                if !matches!(question.kind, QuestionKind::Coding(_)) {
                    continue;
                }
                let Some(entry) = attempt.answer_mut(&question.id) else {
                    continue;
                };
                if let Some(run) = resolved.get(&question.id) {
                    if entry.needs_execution() {
                        let run_token = entry
                            .judge
                            .as_ref()
                            .map(|judge| judge.run_token.clone())
                            .unwrap_or_else(new_run_token);
                        apply_run(entry, run, &run_token);
                    }
                } else if entry.code.as_deref().map_or(true, |code| code.trim().is_empty()) {
                    entry.marks_obtained = 0.0;
                    entry.is_correct = false;
                }
            }

            apply_totals(attempt, exam);
            let now = primitive_now_utc();
            attempt.graded_at = Some(now);
            attempt.submitted_at.get_or_insert(now);
            attempt.status =
                if exam.has_theory() { SubmissionStatus::Submitted } else { SubmissionStatus::Graded };
            Ok(Mutation::Write(true))
        },
    )
    .await?;

    if transitioned {
        let grade_label = match graded.grade {
            Some(Grade::Green) => "green",
            Some(Grade::Amber) => "amber",
            Some(Grade::Red) | None => "red",
        };
        metrics::counter!("exam_finalizations_total", "grade" => grade_label).increment(1);
        tracing::info!(
            exam_id = %exam.id,
            student_id,
            submission_id = %graded.id,
            status = graded.status.as_str(),
            obtained = graded.total_marks_obtained,
            max = graded.total_marks_max,
            percentage = graded.percentage_score,
            grade = grade_label,
            "Attempt scored"
        );
        record_completion(state, exam, &graded).await;
    }

    Ok(graded)
}

/// Course-side effects of a finished attempt. Failures are logged and never surface.
async fn record_completion(state: &AppState, exam: &Exam, submission: &ExamSubmission) {
    if let Some((course_id, week_number)) = exam.module_link() {
        if let Err(err) = state
            .progress()
            .mark_module_complete(&submission.student_id, course_id, week_number)
            .await
        {
            tracing::warn!(
                exam_id = %exam.id,
                student_id = %submission.student_id,
                course_id,
                week_number,
                error = %err,
                "Failed to mark course module complete"
            );
        }
    }

    match state.reexams().complete_if_approved(&submission.student_id, &exam.id).await {
        Ok(true) => tracing::info!(
            exam_id = %exam.id,
            student_id = %submission.student_id,
            "Approved re-exam request completed"
        ),
        Ok(false) => {}
        Err(err) => tracing::warn!(
            exam_id = %exam.id,
            student_id = %submission.student_id,
            error = %err,
            "Failed to complete re-exam request"
        ),
    }
}
