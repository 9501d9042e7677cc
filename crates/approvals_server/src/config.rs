//! Server configuration and engine wiring.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use approvals_core::ports::RoleDirectory;
use approvals_core::{ApprovalEngine, MemoryStore, StaticRoleDirectory, TracingNotifier};
use approvals_postgres::PgStores;

/// Approval workflow server
#[derive(Debug, Clone, Parser)]
#[command(name = "approvals_server", version, about)]
pub struct ServerConfig {
    /// Listen address
    #[arg(long, env = "APPROVALS_BIND_ADDR", default_value = "0.0.0.0:4200")]
    pub bind_addr: SocketAddr,

    /// Postgres connection string; the in-memory store is used when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "APPROVALS_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// YAML file mapping role names to user ids
    #[arg(long, env = "APPROVALS_ROLES_FILE")]
    pub roles_file: Option<PathBuf>,

    /// Apply embedded migrations at startup
    #[arg(
        long,
        env = "APPROVALS_RUN_MIGRATIONS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub run_migrations: bool,
}

impl ServerConfig {
    pub fn load_roles(&self) -> anyhow::Result<StaticRoleDirectory> {
        match &self.roles_file {
            Some(path) => {
                let roles = StaticRoleDirectory::from_file(path)?;
                tracing::info!(path = %path.display(), roles = roles.role_count(), "role directory loaded");
                Ok(roles)
            }
            None => {
                tracing::warn!("APPROVALS_ROLES_FILE not set; role-assigned steps resolve to nobody");
                Ok(StaticRoleDirectory::new())
            }
        }
    }

    /// Build the engine over Postgres, or over memory when no database is configured.
    pub async fn build_engine(&self) -> anyhow::Result<ApprovalEngine> {
        let roles: Arc<dyn RoleDirectory> = Arc::new(self.load_roles()?);
        let notifier = Arc::new(TracingNotifier);

        let Some(database_url) = &self.database_url else {
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            let store = Arc::new(MemoryStore::new());
            return Ok(ApprovalEngine::new(store.clone(), store, roles, notifier));
        };

        let pool = approvals_postgres::connect(database_url, self.max_connections).await?;
        tracing::info!(max_connections = self.max_connections, "Connected to database");

        if self.run_migrations {
            approvals_postgres::migrate(&pool)
                .await
                .context("startup migrations")?;
            tracing::info!("migrations applied");
        }

        let stores = PgStores::new(pool);
        Ok(ApprovalEngine::new(
            stores.templates,
            stores.instances,
            roles,
            notifier,
        ))
    }
}
