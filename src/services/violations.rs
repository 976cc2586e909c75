use serde::Serialize;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::db::models::{CheatingLog, ExamSubmission};
use crate::db::types::{SubmissionReason, SubmissionStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct IntegrityReport {
    pub(crate) violation_delta: u32,
    pub(crate) cheating_detected: bool,
    pub(crate) cheating_logs: Vec<ReportedIncident>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ReportedIncident {
    pub(crate) kind: String,
    pub(crate) detail: Option<String>,
    pub(crate) occurred_at: Option<OffsetDateTime>,
}

impl IntegrityReport {
    pub(crate) fn is_empty(&self) -> bool {
        self.violation_delta == 0 && !self.cheating_detected && self.cheating_logs.is_empty()
    }
}

/// Adds the report to the running counters. Logs are only ever appended.
pub(crate) fn merge_report(
    submission: &mut ExamSubmission,
    report: &IntegrityReport,
    now: OffsetDateTime,
) {
    let delta = i32::try_from(report.violation_delta).unwrap_or(i32::MAX);
    submission.violation_count = submission.violation_count.saturating_add(delta);
    submission.cheating_detected |= report.cheating_detected;
    submission.cheating_logs.0.extend(report.cheating_logs.iter().map(|incident| CheatingLog {
        kind: incident.kind.clone(),
        detail: incident.detail.clone(),
        occurred_at: incident.occurred_at.unwrap_or(now),
    }));
}

pub(crate) fn auto_submit_reason(
    submission: &ExamSubmission,
    violation_limit: u32,
) -> Option<SubmissionReason> {
    if submission.cheating_detected {
        Some(SubmissionReason::CheatingDetected)
    } else if submission.violation_count >= i32::try_from(violation_limit).unwrap_or(i32::MAX) {
        Some(SubmissionReason::ViolationLimit)
    } else {
        None
    }
}

/// Moves a modifiable attempt to `submitted`. Scoring is left to finalization.
pub(crate) fn lock_attempt(
    submission: &mut ExamSubmission,
    reason: SubmissionReason,
    now: PrimitiveDateTime,
) {
    submission.status = SubmissionStatus::Submitted;
    submission.submitted_at = Some(now);
    submission.submission_reason = Some(reason);
}
