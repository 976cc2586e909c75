use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerEntry, CheatingLog, ExamSubmission, TestCaseResult};
use crate::db::types::{Grade, JudgeStatus, QuestionType, SubmissionReason, SubmissionStatus};
use crate::services::answers::{AnswerSubmission, RunCodeResult};
use crate::services::finalize::{FinalAnswer, FinalSubmission};
use crate::services::scoring::RawAnswer;
use crate::services::violations::{IntegrityReport, ReportedIncident};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct CheatingLogRequest {
    #[validate(length(min = 1, max = 64, message = "kind must be 1..64 characters"))]
    pub(crate) kind: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "detail must be at most 1000 characters"))]
    pub(crate) detail: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) occurred_at: Option<OffsetDateTime>,
}

impl From<CheatingLogRequest> for ReportedIncident {
    fn from(log: CheatingLogRequest) -> Self {
        Self { kind: log.kind, detail: log.detail, occurred_at: log.occurred_at }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct IntegrityRequest {
    #[serde(default)]
    #[validate(range(max = 100, message = "violation_count_delta must be at most 100"))]
    pub(crate) violation_count_delta: u32,
    #[serde(default)]
    pub(crate) cheating_detected: bool,
    #[serde(default)]
    #[validate(nested, length(max = 100, message = "cheating_logs must contain at most 100 items"))]
    pub(crate) cheating_logs: Vec<CheatingLogRequest>,
}

impl From<IntegrityRequest> for IntegrityReport {
    fn from(request: IntegrityRequest) -> Self {
        Self {
            violation_delta: request.violation_count_delta,
            cheating_detected: request.cheating_detected,
            cheating_logs: request.cheating_logs.into_iter().map(ReportedIncident::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    /// Kept as raw JSON so a non-integer selection is reported as a validation error.
    #[serde(default)]
    pub(crate) selected_option: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(length(max = 50000, message = "text_answer is too long"))]
    pub(crate) text_answer: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100000, message = "code is too long"))]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "time_spent must be non-negative"))]
    pub(crate) time_spent: i64,
    #[serde(default)]
    pub(crate) sequence: Option<i64>,
    #[serde(flatten)]
    #[validate(nested)]
    pub(crate) integrity: IntegrityRequest,
}

impl From<SubmitAnswerRequest> for AnswerSubmission {
    fn from(request: SubmitAnswerRequest) -> Self {
        Self {
            question_id: request.question_id,
            answer: RawAnswer {
                selected_option: request.selected_option,
                text_answer: request.text_answer,
                code: request.code,
                language: request.language,
            },
            time_spent: request.time_spent,
            integrity: request.integrity.into(),
            sequence: request.sequence,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RunCodeRequest {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[validate(length(min = 1, max = 100000, message = "code must be 1..100000 characters"))]
    pub(crate) code: String,
    #[validate(length(min = 1, message = "language must not be empty"))]
    pub(crate) language: String,
}

impl RunCodeRequest {
    pub(crate) fn into_answer(self) -> (String, RawAnswer) {
        (
            self.question_id,
            RawAnswer {
                code: Some(self.code),
                language: Some(self.language),
                ..RawAnswer::default()
            },
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct FinalAnswerRequest {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) selected_option: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(length(max = 50000, message = "text_answer is too long"))]
    pub(crate) text_answer: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100000, message = "code is too long"))]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "time_spent must be non-negative"))]
    pub(crate) time_spent: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct SubmitExamRequest {
    #[serde(default)]
    #[validate(nested)]
    pub(crate) answers: Vec<FinalAnswerRequest>,
    #[serde(flatten)]
    #[validate(nested)]
    pub(crate) integrity: IntegrityRequest,
}

impl From<SubmitExamRequest> for FinalSubmission {
    fn from(request: SubmitExamRequest) -> Self {
        Self {
            answers: request
                .answers
                .into_iter()
                .map(|answer| FinalAnswer {
                    question_id: answer.question_id,
                    answer: RawAnswer {
                        selected_option: answer.selected_option,
                        text_answer: answer.text_answer,
                        code: answer.code,
                        language: answer.language,
                    },
                    time_spent: answer.time_spent,
                })
                .collect(),
            integrity: request.integrity.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateTheoryRequest {
    pub(crate) marks: HashMap<String, f64>,
}

/// Who is looking at a submission decides how much of the judge output is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Audience {
    Student,
    Trainer,
}

#[derive(Debug, Serialize)]
pub(crate) struct TestCaseResultResponse {
    pub(crate) index: usize,
    pub(crate) hidden: bool,
    pub(crate) passed: bool,
    pub(crate) status: String,
    pub(crate) stdout: Option<String>,
    pub(crate) stderr: Option<String>,
    pub(crate) compile_output: Option<String>,
}

fn to_test_case_response(result: &TestCaseResult, audience: Audience) -> TestCaseResultResponse {
    let redact = result.hidden && audience == Audience::Student;
    TestCaseResultResponse {
        index: result.index,
        hidden: result.hidden,
        passed: result.passed,
        status: result.status.clone(),
        stdout: if redact { None } else { result.stdout.clone() },
        stderr: if redact { None } else { result.stderr.clone() },
        compile_output: result.compile_output.clone(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JudgeRunResponse {
    pub(crate) status: JudgeStatus,
    pub(crate) error: Option<String>,
    pub(crate) test_cases_passed: u32,
    pub(crate) test_cases_failed: u32,
    pub(crate) results: Vec<TestCaseResultResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) question_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) selected_option: Option<usize>,
    pub(crate) code: Option<String>,
    pub(crate) language: Option<String>,
    pub(crate) last_run_code: Option<String>,
    pub(crate) text_answer: Option<String>,
    pub(crate) answered: bool,
    pub(crate) is_correct: bool,
    pub(crate) marks_obtained: f64,
    pub(crate) marks_max: f64,
    pub(crate) time_spent: i64,
    pub(crate) judge: Option<JudgeRunResponse>,
}

fn to_answer_response(entry: &AnswerEntry, audience: Audience) -> AnswerResponse {
    AnswerResponse {
        question_id: entry.question_id.clone(),
        question_type: entry.question_type,
        selected_option: entry.selected_option,
        code: entry.code.clone(),
        language: entry.language.clone(),
        last_run_code: entry.last_run_code.clone(),
        text_answer: entry.text_answer.clone(),
        answered: entry.answered,
        is_correct: entry.is_correct,
        marks_obtained: entry.marks_obtained,
        marks_max: entry.marks_max,
        time_spent: entry.time_spent,
        judge: entry.judge.as_ref().map(|run| JudgeRunResponse {
            status: run.status,
            error: run.error.clone(),
            test_cases_passed: run.test_cases_passed,
            test_cases_failed: run.test_cases_failed,
            results: run
                .results
                .iter()
                .map(|result| to_test_case_response(result, audience))
                .collect(),
        }),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) evaluated_at: Option<String>,
    pub(crate) evaluated_by: Option<String>,
    pub(crate) answers: Vec<AnswerResponse>,
    pub(crate) violation_count: i32,
    pub(crate) cheating_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cheating_logs: Option<Vec<CheatingLog>>,
    pub(crate) submission_reason: Option<SubmissionReason>,
    pub(crate) total_marks_obtained: f64,
    pub(crate) total_marks_max: f64,
    pub(crate) percentage_score: f64,
    pub(crate) grade: Option<Grade>,
    pub(crate) qualified: bool,
    pub(crate) time_spent: i64,
    pub(crate) questions_answered: i32,
    pub(crate) progress_percentage: f64,
}

impl SubmissionResponse {
    pub(crate) fn new(submission: &ExamSubmission, audience: Audience) -> Self {
        Self {
            id: submission.id.clone(),
            exam_id: submission.exam_id.clone(),
            student_id: submission.student_id.clone(),
            status: submission.status,
            started_at: submission.started_at.map(format_primitive),
            submitted_at: submission.submitted_at.map(format_primitive),
            graded_at: submission.graded_at.map(format_primitive),
            evaluated_at: submission.evaluated_at.map(format_primitive),
            evaluated_by: submission.evaluated_by.clone(),
            answers: submission
                .answers
                .0
                .iter()
                .map(|entry| to_answer_response(entry, audience))
                .collect(),
            violation_count: submission.violation_count,
            cheating_detected: submission.cheating_detected,
            cheating_logs: (audience == Audience::Trainer)
                .then(|| submission.cheating_logs.0.clone()),
            submission_reason: submission.submission_reason,
            total_marks_obtained: submission.total_marks_obtained,
            total_marks_max: submission.total_marks_max,
            percentage_score: submission.percentage_score,
            grade: submission.grade,
            qualified: submission.qualified,
            time_spent: submission.time_spent,
            questions_answered: submission.questions_answered,
            progress_percentage: submission.progress_percentage,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RunCodeResponse {
    pub(crate) question_id: String,
    pub(crate) judge_status: JudgeStatus,
    pub(crate) error: Option<String>,
    pub(crate) test_cases_passed: u32,
    pub(crate) test_cases_failed: u32,
    pub(crate) results: Vec<TestCaseResultResponse>,
    pub(crate) marks_obtained: f64,
    pub(crate) marks_max: f64,
}

impl From<RunCodeResult> for RunCodeResponse {
    fn from(result: RunCodeResult) -> Self {
        Self {
            results: result
                .results
                .iter()
                .map(|case| to_test_case_response(case, Audience::Student))
                .collect(),
            question_id: result.question_id,
            judge_status: result.judge_status,
            error: result.error,
            test_cases_passed: result.test_cases_passed,
            test_cases_failed: result.test_cases_failed,
            marks_obtained: result.marks_obtained,
            marks_max: result.marks_max,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingEvaluationResponse {
    pub(crate) exam_id: String,
    pub(crate) submissions: Vec<SubmissionResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_request_reads_flattened_integrity_fields() {
        let request: SubmitAnswerRequest = serde_json::from_value(json!({
            "question_id": "q1",
            "selected_option": 2,
            "time_spent": 30,
            "violation_count_delta": 1,
            "cheating_logs": [{"kind": "tab_switch"}],
            "sequence": 4
        }))
        .expect("request");
        request.validate().expect("valid");

        let submission = AnswerSubmission::from(request);
        assert_eq!(submission.integrity.violation_delta, 1);
        assert_eq!(submission.integrity.cheating_logs.len(), 1);
        assert_eq!(submission.sequence, Some(4));
        assert_eq!(submission.answer.selected_option, Some(json!(2)));
    }

    #[test]
    fn negative_time_spent_fails_validation() {
        let request: SubmitAnswerRequest =
            serde_json::from_value(json!({"question_id": "q1", "time_spent": -5}))
                .expect("request");
        assert!(request.validate().is_err());
    }

    #[test]
    fn cheating_log_batches_are_capped() {
        let logs: Vec<_> = (0..101).map(|_| json!({"kind": "tab_switch"})).collect();
        let request: SubmitAnswerRequest =
            serde_json::from_value(json!({"question_id": "q1", "cheating_logs": logs}))
                .expect("request");
        let errors = request.validate().expect_err("too many logs");
        assert!(errors.to_string().contains("cheating_logs"), "errors: {errors}");

        let request: SubmitAnswerRequest = serde_json::from_value(
            json!({"question_id": "q1", "cheating_logs": [{"kind": ""}]}),
        )
        .expect("request");
        assert!(request.validate().is_err());
    }

    #[test]
    fn hidden_case_output_is_redacted_for_students_only() {
        let result = TestCaseResult {
            index: 0,
            hidden: true,
            passed: false,
            status: "Accepted".into(),
            stdout: Some("secret".into()),
            stderr: Some("trace".into()),
            compile_output: None,
        };

        let student = to_test_case_response(&result, Audience::Student);
        let trainer = to_test_case_response(&result, Audience::Trainer);

        assert!(student.stdout.is_none() && student.stderr.is_none());
        assert_eq!(trainer.stdout.as_deref(), Some("secret"));
    }
}
