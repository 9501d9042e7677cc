//! approvals_server: standalone REST server for approval workflows.
//!
//! Reads config from flags or env vars (see `ServerConfig`):
//!   DATABASE_URL                 Postgres connection string (optional)
//!   APPROVALS_BIND_ADDR          listen address (default: 0.0.0.0:4200)
//!   APPROVALS_DB_MAX_CONNECTIONS pool size (default: 10)
//!   APPROVALS_ROLES_FILE         YAML role directory (optional)
//!   APPROVALS_RUN_MIGRATIONS     apply migrations at startup (default: true)

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approvals_server::config::ServerConfig;
use approvals_server::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "approvals_server=debug,approvals_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();
    let engine = Arc::new(config.build_engine().await?);
    let app = build_router(engine);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("approvals_server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("approvals_server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutdown signal received");
}
