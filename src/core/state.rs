use std::sync::Arc;
use std::time::Duration;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::store::{CourseProgress, ExamCatalog, ReexamRequests, SubmissionStore};
use crate::services::judge::CodeJudge;
use crate::services::judge_jobs::JudgeJobs;

/// Outbound dependencies of the exam engine, each behind its trait seam.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) catalog: Arc<dyn ExamCatalog>,
    pub(crate) submissions: Arc<dyn SubmissionStore>,
    pub(crate) judge: Arc<dyn CodeJudge>,
    pub(crate) progress: Arc<dyn CourseProgress>,
    pub(crate) reexams: Arc<dyn ReexamRequests>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecutionLimits {
    pub(crate) cpu_time_limit_seconds: f64,
    /// Upper bound for one judge call, retries included.
    pub(crate) call_timeout: Duration,
}

impl ExecutionLimits {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            cpu_time_limit_seconds: settings.judge().cpu_time_limit_seconds,
            call_timeout: settings.judge().call_timeout(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    redis: RedisHandle,
    collaborators: Collaborators,
    limits: ExecutionLimits,
    jobs: JudgeJobs,
}

impl AppState {
    pub(crate) fn new(settings: Settings, redis: RedisHandle, collaborators: Collaborators) -> Self {
        let limits = ExecutionLimits::from_settings(&settings);
        Self::with_limits(settings, redis, collaborators, limits)
    }

    pub(crate) fn with_limits(
        settings: Settings,
        redis: RedisHandle,
        collaborators: Collaborators,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState {
                settings,
                redis,
                collaborators,
                limits,
                jobs: JudgeJobs::default(),
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn catalog(&self) -> &dyn ExamCatalog {
        self.inner.collaborators.catalog.as_ref()
    }

    pub(crate) fn submissions(&self) -> &dyn SubmissionStore {
        self.inner.collaborators.submissions.as_ref()
    }

    pub(crate) fn judge(&self) -> Arc<dyn CodeJudge> {
        self.inner.collaborators.judge.clone()
    }

    pub(crate) fn progress(&self) -> &dyn CourseProgress {
        self.inner.collaborators.progress.as_ref()
    }

    pub(crate) fn reexams(&self) -> &dyn ReexamRequests {
        self.inner.collaborators.reexams.as_ref()
    }

    pub(crate) fn limits(&self) -> ExecutionLimits {
        self.inner.limits
    }

    pub(crate) fn jobs(&self) -> &JudgeJobs {
        &self.inner.jobs
    }
}
