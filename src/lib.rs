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

use crate::core::{config::Settings, redis::RedisHandle, shutdown::Shutdown, state::AppState};
use crate::core::security::{self, Identity};
use crate::core::telemetry;
use crate::db::types::UserRole;
use crate::repositories::PgStore;
use crate::services::notifier::RedisNotifier;

async fn bootstrap() -> anyhow::Result<(AppState, RedisHandle)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; realtime events will be dropped");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let state = AppState::new(
        settings,
        Arc::new(PgStore::new(db_pool)),
        Arc::new(RedisNotifier::new(redis.clone())),
        Some(redis.clone()),
    );

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
        "Proctor API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(Shutdown::on_signal().triggered()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let (state, redis) = bootstrap().await?;

    tasks::scheduler::run(state, Shutdown::on_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    Ok(())
}

/// Signs an identity token with the configured secret, for operators and
/// local clients.
pub fn issue_token(user_id: &str, email: &str, role: &str) -> anyhow::Result<String> {
    dotenvy::dotenv().ok();
    let settings = Settings::load()?;

    let role = match role.trim().to_ascii_lowercase().as_str() {
        "student" => UserRole::Student,
        "faculty" => UserRole::Faculty,
        other => anyhow::bail!("unknown role {other:?}; expected student or faculty"),
    };
    let identity = Identity {
        user_id: user_id.trim().to_string(),
        email: security::normalize_email(email),
        role,
    };

    Ok(security::create_access_token(&identity, &settings, None)?)
}
