//! # Focus Forge Worker
//!
//! Marks pending invitations past their expiry as `expired` on a fixed
//! interval, in both the team and project invitation tables.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/focusforge cargo run -p focusforge-worker
//! ```

use anyhow::Context;
use focusforge_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use focusforge_worker::{config::WorkerConfig, sweeper::InvitationSweeper};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "focusforge_worker=debug,focusforge_shared=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "Focus Forge Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = WorkerConfig::from_env().context("invalid configuration")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        min_connections: 1,
        ..DatabaseConfig::default()
    })
    .await
    .context("failed to connect to database")?;

    let sweeper = InvitationSweeper::new(pool.clone(), config.sweep_interval);
    let shutdown = sweeper.shutdown_token();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    sweeper.run().await;

    close_pool(pool).await;
    tracing::info!("Worker stopped");

    Ok(())
}
