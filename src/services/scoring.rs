use serde::Serialize;
use serde_json::Value;

use crate::db::models::{McqOption, Question, QuestionKind};
use crate::services::errors::ExamError;
use crate::services::grading::round2;
use crate::services::judge::{CodeJudge, JudgeOutcome};

/// Answer fields as sent by the client, before they are checked against the question.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct RawAnswer {
    pub(crate) selected_option: Option<Value>,
    pub(crate) text_answer: Option<String>,
    pub(crate) code: Option<String>,
    pub(crate) language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AnswerPayload {
    Mcq { selected_option: usize, is_correct: bool, marks: f64 },
    Theory { text_answer: String },
    Coding { code: String, language: String },
}

/// Checks the raw answer against the question and scores it where that needs no judge.
pub(crate) fn validate_answer(
    question: &Question,
    raw: &RawAnswer,
    judge: &dyn CodeJudge,
) -> Result<AnswerPayload, ExamError> {
    match &question.kind {
        QuestionKind::Mcq { options } => {
            let selected = raw
                .selected_option
                .as_ref()
                .filter(|value| !value.is_null())
                .ok_or_else(|| ExamError::validation("selected_option is required"))?;
            let index = selected
                .as_u64()
                .and_then(|value| usize::try_from(value).ok())
                .ok_or_else(|| ExamError::validation("selected_option must be a non-negative integer"))?;
            if index >= options.len() {
                return Err(ExamError::validation(format!(
                    "selected_option {index} is out of range for {} options",
                    options.len()
                )));
            }

            let is_correct = mcq_is_correct(options, index);
            let marks = if is_correct { question.marks } else { 0.0 };
            Ok(AnswerPayload::Mcq { selected_option: index, is_correct, marks })
        }
        QuestionKind::Theory => {
            let text_answer = raw
                .text_answer
                .clone()
                .ok_or_else(|| ExamError::validation("text_answer is required"))?;
            Ok(AnswerPayload::Theory { text_answer })
        }
        QuestionKind::Coding(_) => {
            let code = raw
                .code
                .clone()
                .filter(|code| !code.trim().is_empty())
                .ok_or_else(|| ExamError::validation("code must not be empty"))?;
            let language = raw
                .language
                .as_deref()
                .map(str::trim)
                .filter(|language| !language.is_empty())
                .ok_or_else(|| ExamError::validation("language is required"))?;
            if !judge.supports_language(language) {
                return Err(ExamError::validation(format!(
                    "language '{language}' is not supported"
                )));
            }

            Ok(AnswerPayload::Coding { code, language: language.to_ascii_lowercase() })
        }
    }
}

pub(crate) fn mcq_is_correct(options: &[McqOption], index: usize) -> bool {
    options.get(index).is_some_and(|option| option.is_correct)
}

fn normalize_output(value: &str) -> String {
    value.replace("\r\n", "\n").trim().to_string()
}

pub(crate) fn test_case_passes(outcome: &JudgeOutcome, expected_output: &str) -> bool {
    outcome.accepted()
        && normalize_output(outcome.stdout.as_deref().unwrap_or_default())
            == normalize_output(expected_output)
}

/// Proportional credit; a question without test cases earns nothing.
pub(crate) fn coding_marks(passed: u32, total: u32, marks_max: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(passed as f64 / total as f64 * marks_max)
}
