use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::db::types::{Grade, JudgeStatus, QuestionType, SubmissionReason, SubmissionStatus};

pub(crate) const DEFAULT_QUALIFICATION_PERCENTAGE: f64 = 50.0;
pub(crate) const DEFAULT_EXCELLENT_MIN: f64 = 80.0;
pub(crate) const DEFAULT_GOOD_MIN: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct GradeThresholds {
    pub(crate) qualification_percentage: f64,
    pub(crate) excellent_min: f64,
    pub(crate) good_min: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            qualification_percentage: DEFAULT_QUALIFICATION_PERCENTAGE,
            excellent_min: DEFAULT_EXCELLENT_MIN,
            good_min: DEFAULT_GOOD_MIN,
        }
    }
}

/// Exam definition as read from the catalog. Never mutated by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) course_id: Option<String>,
    pub(crate) week_number: Option<i32>,
    pub(crate) questions: Vec<Question>,
    pub(crate) thresholds: GradeThresholds,
}

impl Exam {
    pub(crate) fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == question_id)
    }

    /// Sum of marks over every question, answered or not. Negative marks count as zero.
    pub(crate) fn max_marks(&self) -> f64 {
        self.questions.iter().map(|question| question.marks.max(0.0)).sum()
    }

    pub(crate) fn has_theory(&self) -> bool {
        self.questions.iter().any(|question| matches!(question.kind, QuestionKind::Theory))
    }

    pub(crate) fn module_link(&self) -> Option<(&str, i32)> {
        match (&self.course_id, self.week_number) {
            (Some(course_id), Some(week)) => Some((course_id.as_str(), week)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) course_id: Option<String>,
    pub(crate) week_number: Option<i32>,
    pub(crate) questions: Json<Vec<Question>>,
    pub(crate) qualification_percentage: f64,
    pub(crate) excellent_min: f64,
    pub(crate) good_min: f64,
}

impl From<ExamRow> for Exam {
    fn from(row: ExamRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            course_id: row.course_id,
            week_number: row.week_number,
            questions: row.questions.0,
            thresholds: GradeThresholds {
                qualification_percentage: row.qualification_percentage,
                excellent_min: row.excellent_min,
                good_min: row.good_min,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) prompt: String,
    pub(crate) marks: f64,
    #[serde(flatten)]
    pub(crate) kind: QuestionKind,
}

impl Question {
    pub(crate) fn question_type(&self) -> QuestionType {
        match self.kind {
            QuestionKind::Mcq { .. } => QuestionType::Mcq,
            QuestionKind::Coding(_) => QuestionType::Coding,
            QuestionKind::Theory => QuestionType::Theory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum QuestionKind {
    Mcq { options: Vec<McqOption> },
    Coding(CodingQuestion),
    Theory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct McqOption {
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
    #[serde(default)]
    pub(crate) label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CodingQuestion {
    pub(crate) language: String,
    #[serde(default)]
    pub(crate) boilerplate: String,
    /// Driver appended to the student's code before execution; never shown to students.
    #[serde(default)]
    pub(crate) main_block: String,
    #[serde(default)]
    pub(crate) test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestCase {
    #[serde(default)]
    pub(crate) input: String,
    pub(crate) expected_output: String,
    #[serde(default)]
    pub(crate) hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSubmission {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
    pub(crate) evaluated_by: Option<String>,
    pub(crate) answers: Json<Vec<AnswerEntry>>,
    pub(crate) violation_count: i32,
    pub(crate) cheating_detected: bool,
    pub(crate) cheating_logs: Json<Vec<CheatingLog>>,
    pub(crate) submission_reason: Option<SubmissionReason>,
    pub(crate) total_marks_obtained: f64,
    pub(crate) total_marks_max: f64,
    pub(crate) percentage_score: f64,
    pub(crate) grade: Option<Grade>,
    pub(crate) qualified: bool,
    pub(crate) time_spent: i64,
    pub(crate) questions_answered: i32,
    pub(crate) progress_percentage: f64,
    pub(crate) last_sequence: Option<i64>,
    pub(crate) final_payload_hash: Option<String>,
    pub(crate) version: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl ExamSubmission {
    pub(crate) fn answer(&self, question_id: &str) -> Option<&AnswerEntry> {
        self.answers.0.iter().find(|entry| entry.question_id == question_id)
    }

    pub(crate) fn answer_mut(&mut self, question_id: &str) -> Option<&mut AnswerEntry> {
        self.answers.0.iter_mut().find(|entry| entry.question_id == question_id)
    }

    /// Replaces the entry with the same question id, or appends it.
    pub(crate) fn upsert_answer(&mut self, entry: AnswerEntry) {
        match self.answer_mut(&entry.question_id) {
            Some(existing) => *existing = entry,
            None => self.answers.0.push(entry),
        }
    }

    /// Totals have been computed at least once (auto-graded or pending theory review).
    pub(crate) fn is_scored(&self) -> bool {
        self.graded_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnswerEntry {
    pub(crate) question_id: String,
    pub(crate) question_type: QuestionType,
    #[serde(default)]
    pub(crate) selected_option: Option<usize>,
    #[serde(default)]
    pub(crate) code: Option<String>,
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    pub(crate) last_run_code: Option<String>,
    #[serde(default)]
    pub(crate) text_answer: Option<String>,
    pub(crate) answered: bool,
    pub(crate) is_correct: bool,
    pub(crate) marks_obtained: f64,
    pub(crate) marks_max: f64,
    #[serde(default)]
    pub(crate) time_spent: i64,
    #[serde(default)]
    pub(crate) judge: Option<JudgeRun>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) answered_at: Option<OffsetDateTime>,
}

impl AnswerEntry {
    pub(crate) fn unanswered(question: &Question) -> Self {
        Self {
            question_id: question.id.clone(),
            question_type: question.question_type(),
            selected_option: None,
            code: None,
            language: None,
            last_run_code: None,
            text_answer: None,
            answered: false,
            is_correct: false,
            marks_obtained: 0.0,
            marks_max: question.marks,
            time_spent: 0,
            judge: None,
            answered_at: None,
        }
    }

    /// True when the entry carries code whose judge result is still outstanding.
    pub(crate) fn needs_execution(&self) -> bool {
        let has_code = self.code.as_deref().is_some_and(|code| !code.trim().is_empty());
        let resolved = self
            .judge
            .as_ref()
            .is_some_and(|run| matches!(run.status, JudgeStatus::Completed | JudgeStatus::Failed));
        self.question_type == QuestionType::Coding && has_code && !resolved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct JudgeRun {
    pub(crate) status: JudgeStatus,
    /// Identifies the code revision a background run was started for.
    pub(crate) run_token: String,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) test_cases_passed: u32,
    #[serde(default)]
    pub(crate) test_cases_failed: u32,
    #[serde(default)]
    pub(crate) results: Vec<TestCaseResult>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) dispatched_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TestCaseResult {
    pub(crate) index: usize,
    pub(crate) hidden: bool,
    pub(crate) passed: bool,
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) stdout: Option<String>,
    #[serde(default)]
    pub(crate) stderr: Option<String>,
    #[serde(default)]
    pub(crate) compile_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CheatingLog {
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) detail: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) occurred_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn questions_deserialize_as_tagged_variants() {
        let raw = json!([
            {"id": "q1", "marks": 2.0, "type": "mcq", "options": [
                {"text": "a"}, {"text": "b", "is_correct": true}
            ]},
            {"id": "q2", "marks": 3.0, "type": "coding", "language": "python",
             "main_block": "print(solve())", "test_cases": [
                {"input": "1", "expected_output": "2", "hidden": true}
            ]},
            {"id": "q3", "marks": 4.0, "type": "theory", "prompt": "Explain ownership"}
        ]);

        let questions: Vec<Question> = serde_json::from_value(raw).expect("questions");
        assert_eq!(questions[0].question_type(), QuestionType::Mcq);
        assert_eq!(questions[1].question_type(), QuestionType::Coding);
        assert_eq!(questions[2].question_type(), QuestionType::Theory);

        let QuestionKind::Coding(coding) = &questions[1].kind else {
            panic!("expected coding question");
        };
        assert!(coding.test_cases[0].hidden);
        assert_eq!(coding.main_block, "print(solve())");
    }

    #[test]
    fn exam_max_marks_counts_every_question() {
        let exam = Exam {
            id: "exam".into(),
            title: "Exam".into(),
            course_id: None,
            week_number: None,
            questions: vec![
                Question { id: "a".into(), prompt: String::new(), marks: 6.0, kind: QuestionKind::Theory },
                Question { id: "b".into(), prompt: String::new(), marks: 4.0, kind: QuestionKind::Theory },
            ],
            thresholds: GradeThresholds::default(),
        };
        assert_eq!(exam.max_marks(), 10.0);
        assert!(exam.has_theory());
        assert!(exam.module_link().is_none());
    }
}
