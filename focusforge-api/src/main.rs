//! # Focus Forge API Server
//!
//! REST API for projects, tickets, comments, teams, notifications and the
//! invitation flows that tie users to projects and teams.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/focusforge \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p focusforge-api
//! ```
//!
//! Set `LOG_FORMAT=json` for structured log output.

use anyhow::Context;
use focusforge_api::{
    app::{build_router, AppState},
    config::Config,
};
use focusforge_shared::db::{
    migrations::{get_migration_status, run_migrations},
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "focusforge_api=debug,focusforge_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Focus Forge API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env().context("invalid configuration")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await
    .context("failed to connect to database")?;

    if config.database.run_migrations {
        run_migrations(&pool).await.context("migrations failed")?;
    }

    let status = get_migration_status(&pool).await?;
    tracing::info!(
        applied = status.applied_migrations,
        latest = ?status.latest_version,
        "Database schema ready"
    );

    let address = config.bind_address();
    let app = build_router(AppState::new(pool.clone(), config));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}
