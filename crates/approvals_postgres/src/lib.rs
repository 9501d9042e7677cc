//! PostgreSQL implementations of the approvals_core store ports.
//!
//! Each adapter wraps a `PgPool`. All SQL is runtime-checked
//! (`sqlx::query`, not `sqlx::query!`) so builds never need a live database.

mod instances;
mod rows;
mod templates;

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use instances::PgInstanceStore;
pub use templates::PgTemplateStore;

/// Both store ports over one pool
pub struct PgStores {
    pub templates: Arc<PgTemplateStore>,
    pub instances: Arc<PgInstanceStore>,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            templates: Arc::new(PgTemplateStore::new(pool.clone())),
            instances: Arc::new(PgInstanceStore::new(pool)),
        }
    }
}

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("connecting to PostgreSQL")
}

/// Apply the embedded migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running workflow migrations")
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
