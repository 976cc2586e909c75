use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionstatus", rename_all = "snake_case")]
pub(crate) enum SubmissionStatus {
    #[serde(alias = "pending")]
    NotStarted,
    InProgress,
    Submitted,
    Graded,
    Evaluated,
}

impl SubmissionStatus {
    /// Answers and integrity reports are only accepted in these states.
    pub(crate) fn is_modifiable(self) -> bool {
        matches!(self, Self::NotStarted | Self::InProgress)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Graded => "graded",
            Self::Evaluated => "evaluated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "qualificationgrade", rename_all = "lowercase")]
pub(crate) enum Grade {
    Green,
    Amber,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionreason", rename_all = "snake_case")]
pub(crate) enum SubmissionReason {
    Manual,
    ViolationLimit,
    CheatingDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum QuestionType {
    Mcq,
    Coding,
    Theory,
}

impl QuestionType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Mcq => "mcq",
            Self::Coding => "coding",
            Self::Theory => "theory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum JudgeStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    #[default]
    Student,
    Trainer,
}
