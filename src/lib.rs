pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{
    config::Settings,
    redis::RedisHandle,
    state::{AppState, Collaborators},
    telemetry,
};
use crate::repositories::exams::PgExamCatalog;
use crate::repositories::progress::{PgCourseProgress, PgReexamRequests};
use crate::repositories::submissions::PgSubmissionStore;
use crate::services::judge::Judge0Client;

fn collaborators(settings: &Settings, pool: PgPool) -> anyhow::Result<Collaborators> {
    Ok(Collaborators {
        catalog: Arc::new(PgExamCatalog::new(pool.clone())),
        submissions: Arc::new(PgSubmissionStore::new(pool.clone())),
        judge: Arc::new(Judge0Client::from_settings(settings)?),
        progress: Arc::new(PgCourseProgress::new(pool.clone())),
        reexams: Arc::new(PgReexamRequests::new(pool)),
    })
}

async fn build_state(settings: Settings) -> anyhow::Result<(AppState, RedisHandle)> {
    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; run-code limits are off");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let collaborators = collaborators(&settings, db_pool)?;
    Ok((AppState::new(settings, redis.clone(), collaborators), redis))
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let (state, redis) = build_state(settings).await?;
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        judge = %state.settings().judge().base_url,
        "Examhall API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let (state, redis) = build_state(settings).await?;

    tracing::info!(
        interval_seconds = state.settings().exam().maintenance_interval_seconds,
        stale_judge_run_minutes = state.settings().exam().stale_judge_run_minutes,
        "Examhall worker started"
    );

    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
