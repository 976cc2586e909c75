use anyhow::{Context, Result};
use time::{Duration, OffsetDateTime};

use crate::core::state::AppState;
use crate::core::time::{is_older_than, primitive_now_utc};
use crate::db::models::QuestionKind;
use crate::db::types::JudgeStatus;
use crate::services::attempts::{load_exam, mutate, IfMissing, Mutation};
use crate::services::code_runs::{dispatch, new_run_token, DispatchedRun};
use crate::services::errors::ExamError;
use crate::services::finalize::complete_grading;

const BATCH_SIZE: i64 = 50;

/// Scores attempts the violation monitor locked but nobody finalized. Attempts touched
/// within `settle` are left to the request that is still finishing them.
pub(crate) async fn finish_auto_submitted(state: &AppState, settle: Duration) -> Result<usize> {
    let candidates = state
        .submissions()
        .list_unscored_submitted(BATCH_SIZE)
        .await
        .context("Failed to fetch unscored submissions")?;

    let now = primitive_now_utc();
    let mut finished = 0;

    for submission in candidates {
        if now - submission.updated_at < settle {
            continue;
        }

        let exam = match load_exam(state.catalog(), &submission.exam_id).await {
            Ok(exam) => exam,
            Err(ExamError::NotFound(_)) => {
                tracing::warn!(
                    exam_id = %submission.exam_id,
                    submission_id = %submission.id,
                    "Exam disappeared, attempt left unscored"
                );
                continue;
            }
            Err(err) => return Err(err).context("Failed to load exam"),
        };

        match complete_grading(state, &exam, &submission.student_id).await {
            Ok(graded) => {
                finished += 1;
                tracing::info!(
                    exam_id = %graded.exam_id,
                    student_id = %graded.student_id,
                    percentage = graded.percentage_score,
                    "Auto-submitted attempt scored"
                );
            }
            Err(err) => tracing::error!(
                exam_id = %submission.exam_id,
                student_id = %submission.student_id,
                error = %err,
                "Failed to score auto-submitted attempt"
            ),
        }
    }

    metrics::counter!("maintenance_attempts_scored_total").increment(finished as u64);
    Ok(finished)
}

/// Re-dispatches judge runs left pending longer than `stale_after`, e.g. after the API
/// process restarted mid-run.
pub(crate) async fn redispatch_stale_judge_runs(
    state: &AppState,
    stale_after: Duration,
) -> Result<usize> {
    let candidates = state
        .submissions()
        .list_with_pending_judge_runs(BATCH_SIZE)
        .await
        .context("Failed to fetch submissions with pending judge runs")?;

    let now = OffsetDateTime::now_utc();
    let mut redispatched = 0;

    for submission in candidates {
        let stale: Vec<(String, String)> = submission
            .answers
            .0
            .iter()
            .filter_map(|entry| {
                let run = entry.judge.as_ref()?;
                (run.status == JudgeStatus::Pending
                    && is_older_than(run.dispatched_at, stale_after, now))
                .then(|| (entry.question_id.clone(), run.run_token.clone()))
            })
            .collect();
        if stale.is_empty() {
            continue;
        }

        let exam = match load_exam(state.catalog(), &submission.exam_id).await {
            Ok(exam) => exam,
            Err(err) => {
                tracing::warn!(exam_id = %submission.exam_id, error = %err, "Skipping stale runs");
                continue;
            }
        };

        for (question_id, stale_token) in stale {
            let Some(question) = exam.question(&question_id) else {
                continue;
            };
            let QuestionKind::Coding(coding) = &question.kind else {
                continue;
            };

            let fresh_token = new_run_token();
            let claimed = mutate(
                state.submissions(),
                &submission.exam_id,
                &submission.student_id,
                IfMissing::NotFound,
                |attempt| {
                    if !attempt.status.is_modifiable() {
                        return Ok(Mutation::Skip(None));
                    }
                    let Some(entry) = attempt.answer_mut(&question_id) else {
                        return Ok(Mutation::Skip(None));
                    };
                    match entry.judge.as_mut() {
                        Some(run)
                            if run.run_token == stale_token
                                && run.status == JudgeStatus::Pending =>
                        {
                            run.run_token.clone_from(&fresh_token);
                            run.dispatched_at = OffsetDateTime::now_utc();
                            let code = entry.code.clone().unwrap_or_default();
                            let language =
                                entry.language.clone().unwrap_or_else(|| coding.language.clone());
                            Ok(Mutation::Write(Some((code, language))))
                        }
                        _ => Ok(Mutation::Skip(None)),
                    }
                },
            )
            .await;

            match claimed {
                Ok((attempt, Some((code, language)))) => {
                    dispatch(
                        state,
                        DispatchedRun {
                            exam_id: attempt.exam_id.clone(),
                            student_id: attempt.student_id.clone(),
                            submission_id: attempt.id.clone(),
                            question_id: question_id.clone(),
                            question: coding.clone(),
                            marks_max: question.marks,
                            code,
                            language,
                            run_token: fresh_token,
                        },
                    );
                    redispatched += 1;
                }
                Ok((_, None)) => {}
                Err(err) => tracing::error!(
                    submission_id = %submission.id,
                    question_id,
                    error = %err,
                    "Failed to claim stale judge run"
                ),
            }
        }
    }

    if redispatched > 0 {
        tracing::info!(redispatched, "Re-dispatched stale judge runs");
    }
    metrics::counter!("maintenance_judge_runs_redispatched_total").increment(redispatched as u64);
    Ok(redispatched)
}
