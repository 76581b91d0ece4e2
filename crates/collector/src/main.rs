mod config;
mod db;
mod error;
mod reading;
mod state;
mod web;

use anyhow::Result;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::Db;
use state::CollectorState;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "collector.toml".to_string());
    let cfg = config::load(&config_path)?;
    let addr = cfg.listen_addr()?;

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&cfg.db_url).await?;
    db.migrate().await?;
    info!(
        db = %cfg.db_url,
        stored = db.count_readings().await?,
        "db ready"
    );

    // ── Shared state (ephemeral, for /api/status) ───────────────────
    let status = CollectorState::shared();
    status
        .write()
        .await
        .record_system("collector started".to_string());

    // ── Web server (runs until interrupted) ─────────────────────────
    web::serve(
        addr,
        AppState {
            db,
            status,
            default_history_hours: cfg.default_history_hours,
            max_history_hours: cfg.max_history_hours,
        },
    )
    .await?;

    info!("collector stopped");
    Ok(())
}
