use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

fn describe() {
    metrics::describe_counter!("exam_answers_total", "Answers accepted, by question type");
    metrics::describe_counter!("exam_auto_submissions_total", "Attempts locked by the violation monitor");
    metrics::describe_counter!("exam_finalizations_total", "Attempts scored, by resulting grade");
    metrics::describe_counter!("exam_write_conflicts_total", "Optimistic version conflicts retried");
    metrics::describe_counter!("judge_runs_total", "Question executions, by judge outcome");
    metrics::describe_histogram!("judge_run_duration_seconds", "Wall time of one question execution");
    metrics::describe_counter!(
        "maintenance_attempts_scored_total",
        "Auto-submitted attempts scored by the worker"
    );
    metrics::describe_counter!(
        "maintenance_judge_runs_redispatched_total",
        "Stale judge runs handed to the judge again"
    );
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
