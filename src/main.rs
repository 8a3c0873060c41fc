use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use marketplace::api;
use marketplace::db::pool::{get_db_pool, run_migrations};
use marketplace::db::queries::user::purge_expired_revocations;
use marketplace::telemetry::init_tracing;
use marketplace::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref()).context("Failed to initialize logging")?;

    let pool = get_db_pool(&config)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let purged = purge_expired_revocations(&pool).await?;
    if purged > 0 {
        info!("Purged {} expired token revocations", purged);
    }

    let addr = config.bind_addr;
    let state = AppState::new(pool, config);
    if !state.assistant.is_configured() {
        warn!("OPENAI_API_KEY not set; /api/chat/ will answer with an error");
    }

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    api::serve(listener, state, shutdown_signal())
        .await
        .context("Server encountered an error")?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, draining in-flight requests...");
}
