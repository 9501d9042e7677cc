//! Postgres-backed template store.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use approvals_core::ports::TemplateStore;
use approvals_core::{Result, TemplateFilter, WorkflowError, WorkflowTemplate};

use crate::rows::{steps_json, TemplateRow, TEMPLATE_COLUMNS};
use crate::is_foreign_key_violation;

pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape LIKE metacharacters so user search text matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<()> {
        let steps = steps_json(&template.steps)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_templates
                (id, code, name, name_local, description, entity_type,
                 steps, is_active, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(template.id)
        .bind(&template.code)
        .bind(&template.name)
        .bind(&template.name_local)
        .bind(&template.description)
        .bind(&template.entity_type)
        .bind(&steps)
        .bind(template.is_active)
        .bind(&template.created_by)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        debug!(template_id = %template.id, "template inserted");
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(row.map(WorkflowTemplate::try_from).transpose()?)
    }

    async fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<WorkflowTemplate>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS}
            FROM workflow_templates
            WHERE ($1::text IS NULL OR entity_type = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR name ILIKE $3 OR name_local ILIKE $3)
            ORDER BY created_at DESC, code
            "#
        ))
        .bind(&filter.entity_type)
        .bind(filter.active)
        .bind(search)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        rows.into_iter()
            .map(|r| WorkflowTemplate::try_from(r).map_err(WorkflowError::from))
            .collect()
    }

    async fn update_template(
        &self,
        template: &WorkflowTemplate,
        steps_changed: bool,
    ) -> Result<bool> {
        let steps = steps_json(&template.steps)?;
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        // Row lock serializes against instance creation, which takes FOR SHARE.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM workflow_templates WHERE id = $1 FOR UPDATE")
                .bind(template.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
        if locked.is_none() {
            return Ok(false);
        }

        if steps_changed {
            let in_use: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM workflow_instances WHERE template_id = $1)",
            )
            .bind(template.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
            if in_use {
                return Err(WorkflowError::InvalidState(format!(
                    "workflow template {} is in use; its steps can no longer change",
                    template.code
                )));
            }
        }

        sqlx::query(
            r#"
            UPDATE workflow_templates
            SET name = $2, name_local = $3, description = $4,
                steps = $5, is_active = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.name_local)
        .bind(&template.description)
        .bind(&steps)
        .bind(template.is_active)
        .bind(template.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        tx.commit().await.map_err(|e| anyhow!(e))?;
        debug!(template_id = %template.id, steps_changed, "template updated");
        Ok(true)
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflow_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_foreign_key_violation(&e) => Err(WorkflowError::InvalidState(format!(
                "workflow template {id} is referenced by workflow instances"
            ))),
            Err(e) => Err(anyhow!(e).into()),
        }
    }
}
