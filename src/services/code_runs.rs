use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::core::state::{AppState, ExecutionLimits};
use crate::db::models::{AnswerEntry, CodingQuestion, JudgeRun, TestCaseResult};
use crate::db::types::{JudgeStatus, SubmissionStatus};
use crate::services::attempts::{mutate, IfMissing, Mutation};
use crate::services::judge::{CodeJudge, JudgeError, JudgeOutcome, JudgeRequest};
use crate::services::scoring::{coding_marks, test_case_passes};
use crate::services::source::compose_source;

/// Result of running one coding answer against all of its question's test cases.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionRun {
    pub(crate) status: JudgeStatus,
    pub(crate) error: Option<String>,
    pub(crate) passed: u32,
    pub(crate) failed: u32,
    pub(crate) results: Vec<TestCaseResult>,
    pub(crate) marks: f64,
    pub(crate) is_correct: bool,
}

impl QuestionRun {
    fn failed(error: String) -> Self {
        Self {
            status: JudgeStatus::Failed,
            error: Some(error),
            passed: 0,
            failed: 0,
            results: Vec::new(),
            marks: 0.0,
            is_correct: false,
        }
    }
}

pub(crate) fn new_run_token() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn pending_run(run_token: String) -> JudgeRun {
    JudgeRun {
        status: JudgeStatus::Pending,
        run_token,
        error: None,
        test_cases_passed: 0,
        test_cases_failed: 0,
        results: Vec::new(),
        dispatched_at: OffsetDateTime::now_utc(),
        completed_at: None,
    }
}

async fn run_case(
    judge: Arc<dyn CodeJudge>,
    limits: ExecutionLimits,
    request: JudgeRequest,
) -> Result<JudgeOutcome, JudgeError> {
    match tokio::time::timeout(limits.call_timeout, judge.execute(&request)).await {
        Ok(result) => result,
        Err(_) => Err(JudgeError::Timeout(limits.call_timeout)),
    }
}

/// Executes every test case concurrently. Any infrastructure failure turns the whole
/// question into a failed run worth 0 marks.
pub(crate) async fn execute_question(
    judge: Arc<dyn CodeJudge>,
    limits: ExecutionLimits,
    question: &CodingQuestion,
    marks_max: f64,
    code: &str,
    language: &str,
) -> QuestionRun {
    let started = Instant::now();
    let source = compose_source(code, &question.main_block);

    let mut cases = JoinSet::new();
    for (index, case) in question.test_cases.iter().enumerate() {
        let request = JudgeRequest {
            source: source.clone(),
            language: language.to_string(),
            stdin: case.input.clone(),
            cpu_time_limit_seconds: limits.cpu_time_limit_seconds,
        };
        let judge = judge.clone();
        cases.spawn(async move { (index, run_case(judge, limits, request).await) });
    }

    let mut outcomes = Vec::with_capacity(question.test_cases.len());
    let mut failure = None;
    while let Some(joined) = cases.join_next().await {
        match joined {
            Ok((index, Ok(outcome))) => outcomes.push((index, outcome)),
            Ok((_, Err(err))) => {
                failure.get_or_insert_with(|| err.to_string());
            }
            Err(err) => {
                failure.get_or_insert_with(|| format!("judge task failed: {err}"));
            }
        }
    }

    let run = match failure {
        Some(error) => {
            cases.abort_all();
            QuestionRun::failed(error)
        }
        None => {
            outcomes.sort_by_key(|(index, _)| *index);
            let results: Vec<TestCaseResult> = outcomes
                .into_iter()
                .map(|(index, outcome)| {
                    let case = &question.test_cases[index];
                    TestCaseResult {
                        index,
                        hidden: case.hidden,
                        passed: test_case_passes(&outcome, &case.expected_output),
                        status: outcome.status,
                        stdout: outcome.stdout,
                        stderr: outcome.stderr,
                        compile_output: outcome.compile_output,
                    }
                })
                .collect();
            let total = results.len() as u32;
            let passed = results.iter().filter(|result| result.passed).count() as u32;

            QuestionRun {
                status: JudgeStatus::Completed,
                error: None,
                passed,
                failed: total - passed,
                results,
                marks: coding_marks(passed, total, marks_max),
                is_correct: total > 0 && passed == total,
            }
        }
    };

    let outcome_label = match run.status {
        JudgeStatus::Completed => "completed",
        JudgeStatus::Failed => "failed",
        JudgeStatus::Pending => "pending",
    };
    metrics::counter!("judge_runs_total", "outcome" => outcome_label).increment(1);
    metrics::histogram!("judge_run_duration_seconds").record(started.elapsed().as_secs_f64());

    run
}

/// Copies a finished run onto the entry, keeping the token it was dispatched with.
pub(crate) fn apply_run(entry: &mut AnswerEntry, run: &QuestionRun, run_token: &str) {
    let dispatched_at = entry
        .judge
        .as_ref()
        .map(|existing| existing.dispatched_at)
        .unwrap_or_else(OffsetDateTime::now_utc);

    entry.judge = Some(JudgeRun {
        status: run.status,
        run_token: run_token.to_string(),
        error: run.error.clone(),
        test_cases_passed: run.passed,
        test_cases_failed: run.failed,
        results: run.results.clone(),
        dispatched_at,
        completed_at: Some(OffsetDateTime::now_utc()),
    });
    entry.marks_obtained = run.marks;
    entry.is_correct = run.is_correct;
}

/// Background judge writes land only while the attempt is unscored and the entry still
/// waits on the same run.
pub(crate) fn accepts_run(
    status: SubmissionStatus,
    scored: bool,
    entry: &AnswerEntry,
    run_token: &str,
) -> bool {
    let open = status.is_modifiable() || (status == SubmissionStatus::Submitted && !scored);
    let waiting = entry.judge.as_ref().is_some_and(|run| {
        run.run_token == run_token && run.status == JudgeStatus::Pending
    });
    open && waiting
}

#[derive(Debug, Clone)]
pub(crate) struct DispatchedRun {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) submission_id: String,
    pub(crate) question_id: String,
    pub(crate) question: CodingQuestion,
    pub(crate) marks_max: f64,
    pub(crate) code: String,
    pub(crate) language: String,
    pub(crate) run_token: String,
}

/// Starts a tracked background run. The caller's response never waits for it.
pub(crate) fn dispatch(state: &AppState, run: DispatchedRun) {
    let task_state = state.clone();
    let submission_id = run.submission_id.clone();
    let question_id = run.question_id.clone();

    state.jobs().spawn(&submission_id, &question_id, async move {
        let result = execute_question(
            task_state.judge(),
            task_state.limits(),
            &run.question,
            run.marks_max,
            &run.code,
            &run.language,
        )
        .await;

        let written = mutate(
            task_state.submissions(),
            &run.exam_id,
            &run.student_id,
            IfMissing::NotFound,
            |submission| {
                let scored = submission.is_scored();
                let status = submission.status;
                let Some(entry) = submission.answer_mut(&run.question_id) else {
                    return Ok(Mutation::Skip(false));
                };
                if !accepts_run(status, scored, entry, &run.run_token) {
                    return Ok(Mutation::Skip(false));
                }
                apply_run(entry, &result, &run.run_token);
                Ok(Mutation::Write(true))
            },
        )
        .await;

        match written {
            Ok((_, true)) => tracing::info!(
                exam_id = %run.exam_id,
                student_id = %run.student_id,
                question_id = %run.question_id,
                judge_status = ?result.status,
                passed = result.passed,
                failed = result.failed,
                "Judge run recorded"
            ),
            Ok((_, false)) => tracing::debug!(
                exam_id = %run.exam_id,
                question_id = %run.question_id,
                "Judge run superseded, result dropped"
            ),
            Err(err) => tracing::error!(
                exam_id = %run.exam_id,
                student_id = %run.student_id,
                question_id = %run.question_id,
                error = %err,
                "Failed to record judge run"
            ),
        }
    });
}
