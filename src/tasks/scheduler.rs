use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::shutdown::{broadcast_on_signal, shutdown_channel};
use crate::core::state::AppState;
use crate::tasks::maintenance;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let handles = vec![
        tokio::spawn(auto_submitted_loop(state.clone(), shutdown_rx.clone())),
        tokio::spawn(stale_judge_runs_loop(state.clone(), shutdown_rx)),
    ];

    broadcast_on_signal(shutdown_tx).await;

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

fn tick_period(state: &AppState) -> Duration {
    Duration::from_secs(state.settings().exam().maintenance_interval_seconds.max(1))
}

async fn auto_submitted_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = tick_period(&state);
    let settle = time::Duration::seconds(period.as_secs() as i64);
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::finish_auto_submitted(&state, settle).await {
                    tracing::error!(error = %err, "finish_auto_submitted failed");
                }
            }
        }
    }
}

async fn stale_judge_runs_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let stale_after =
        time::Duration::minutes(state.settings().exam().stale_judge_run_minutes as i64);
    let mut tick = interval(tick_period(&state));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::redispatch_stale_judge_runs(&state, stale_after).await {
                    tracing::error!(error = %err, "redispatch_stale_judge_runs failed");
                }
            }
        }
    }
}
