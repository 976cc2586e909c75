use thiserror::Error;

use crate::repositories::store::StoreError;

#[derive(Debug, Error)]
pub(crate) enum ExamError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("too many code runs, retry later")]
    RateLimited,
    #[error("submission {submission_id} kept changing under concurrent writers")]
    Contention { submission_id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExamError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
