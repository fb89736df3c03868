pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod services;
pub(crate) mod schemas;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::core::time::SystemClock;
use crate::repositories::store::PgStore;
use crate::services::{attempts::AttemptService, notifications};

fn build_attempt_service(settings: &Settings, db: PgPool) -> anyhow::Result<AttemptService> {
    let store = Arc::new(PgStore::new(db));
    let notifier = notifications::sink_from_settings(settings)?;

    Ok(AttemptService::new(store.clone(), store, notifier, Arc::new(SystemClock))
        .with_drift_warning(settings.exam().clock_drift_warn_seconds))
}

async fn bootstrap() -> anyhow::Result<(AppState, RedisHandle)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; save rate limiting disabled");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let attempts = build_attempt_service(&settings, db_pool.clone())?;
    let state = AppState::new(settings, db_pool, redis.clone(), attempts);
    Ok((state, redis))
}

pub async fn run() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Examflow API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
