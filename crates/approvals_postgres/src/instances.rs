//! Postgres-backed instance store and approval ledger.
//!
//! Decisions commit in one transaction guarded by the instance version. The
//! partial unique index on pending approvals backs up the version check.

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use approvals_core::ports::InstanceStore;
use approvals_core::{
    ApprovalRecord, DecisionPlan, InstanceFilter, InstanceStats, InstanceStatus, Page,
    PendingApproval, Result, StepDefinition, TemplateSummary, WorkflowError, WorkflowInstance,
    WorkflowTemplate,
};

use crate::rows::{
    steps_from_json, to_db_index, ApprovalRow, InstanceRow, TemplateRow, APPROVAL_COLUMNS, INSTANCE_COLUMNS,
    TEMPLATE_COLUMNS,
};
use crate::{is_foreign_key_violation, is_unique_violation};

pub struct PgInstanceStore {
    pool: PgPool,
}

impl PgInstanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A unique violation means another decision already opened this step.
    async fn insert_approval(
        tx: &mut Transaction<'_, Postgres>,
        record: &ApprovalRecord,
    ) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO workflow_approvals
                (id, instance_id, step_index, step_name, assigned_to, assigned_role,
                 status, action_by, action_at, comments, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.instance_id)
        .bind(to_db_index(record.step_index)?)
        .bind(&record.step_name)
        .bind(&record.assigned_to)
        .bind(&record.assigned_role)
        .bind(record.status.as_str())
        .bind(&record.action_by)
        .bind(record.action_at)
        .bind(&record.comments)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(WorkflowError::stale(record.instance_id)),
            Err(e) => Err(anyhow!(e).into()),
        }
    }
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        first: &ApprovalRecord,
        planned_steps: &[StepDefinition],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        // Shared lock holds off a concurrent steps update until commit.
        let stored: Option<(String, serde_json::Value)> = sqlx::query_as(
            "SELECT code, steps FROM workflow_templates WHERE id = $1 FOR SHARE",
        )
        .bind(instance.template_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        let Some((template_code, steps)) = stored else {
            return Err(WorkflowError::template_not_found(instance.template_id));
        };
        if steps_from_json(instance.template_id, steps)? != planned_steps {
            return Err(WorkflowError::InvalidState(format!(
                "workflow template {template_code} changed while starting; retry"
            )));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO workflow_instances
                (id, code, template_id, entity_type, entity_id, current_step, status,
                 priority, requested_by, requested_at, metadata, notes,
                 completed_at, completed_by, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(instance.id)
        .bind(&instance.code)
        .bind(instance.template_id)
        .bind(&instance.entity_type)
        .bind(&instance.entity_id)
        .bind(to_db_index(instance.current_step)?)
        .bind(instance.status.as_str())
        .bind(instance.priority.as_str())
        .bind(&instance.requested_by)
        .bind(instance.requested_at)
        .bind(&instance.metadata)
        .bind(&instance.notes)
        .bind(instance.completed_at)
        .bind(&instance.completed_by)
        .bind(instance.updated_at)
        .bind(instance.version)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(WorkflowError::template_not_found(instance.template_id))
            }
            Err(e) => return Err(anyhow!(e).into()),
        }

        Self::insert_approval(&mut tx, first).await?;

        tx.commit().await.map_err(|e| anyhow!(e))?;
        debug!(instance_id = %instance.id, "instance created");
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(row.map(WorkflowInstance::try_from).transpose()?)
    }

    async fn pending_approval(&self, instance_id: Uuid) -> Result<Option<ApprovalRecord>> {
        let row = sqlx::query_as::<_, ApprovalRow>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM workflow_approvals \
             WHERE instance_id = $1 AND status = 'pending'"
        ))
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(row.map(ApprovalRecord::try_from).transpose()?)
    }

    async fn approvals_for(&self, instance_id: Uuid) -> Result<Vec<ApprovalRecord>> {
        let rows = sqlx::query_as::<_, ApprovalRow>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM workflow_approvals \
             WHERE instance_id = $1 ORDER BY step_index"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        rows.into_iter()
            .map(|r| ApprovalRecord::try_from(r).map_err(WorkflowError::from))
            .collect()
    }

    async fn commit_decision(&self, plan: &DecisionPlan) -> Result<()> {
        let instance_id = plan.instance_id();
        let updated = &plan.updated;
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        // Version gate: loses if anyone committed since we read.
        let moved = sqlx::query(
            r#"
            UPDATE workflow_instances
            SET current_step = $3, status = $4, completed_at = $5,
                completed_by = $6, updated_at = $7, version = $8
            WHERE id = $1 AND version = $2 AND status = $9
            "#,
        )
        .bind(instance_id)
        .bind(plan.expected_version)
        .bind(to_db_index(updated.current_step)?)
        .bind(updated.status.as_str())
        .bind(updated.completed_at)
        .bind(&updated.completed_by)
        .bind(updated.updated_at)
        .bind(updated.version)
        .bind(plan.expected_status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if moved.rows_affected() == 0 {
            warn!(%instance_id, expected_version = plan.expected_version, "stale decision");
            return Err(WorkflowError::stale(&updated.code));
        }

        let closed = sqlx::query(
            r#"
            UPDATE workflow_approvals
            SET status = $2, action_by = $3, action_at = $4, comments = $5
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(plan.closed.id)
        .bind(plan.closed.status.as_str())
        .bind(&plan.closed.action_by)
        .bind(plan.closed.action_at)
        .bind(&plan.closed.comments)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        if closed.rows_affected() == 0 {
            return Err(WorkflowError::stale(&updated.code));
        }

        if let Some(next) = plan.opened() {
            Self::insert_approval(&mut tx, next).await?;
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        debug!(%instance_id, version = updated.version, "decision committed");
        Ok(())
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Page<WorkflowInstance>> {
        const WHERE: &str = r#"
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR entity_type = $2)
              AND ($3::text IS NULL OR requested_by = $3)
              AND ($4::uuid IS NULL OR template_id = $4)
        "#;
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM workflow_instances {WHERE}"
        ))
        .bind(status)
        .bind(&filter.entity_type)
        .bind(&filter.requested_by)
        .bind(filter.template_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_instances {WHERE} \
             ORDER BY requested_at DESC, code LIMIT $5 OFFSET $6"
        ))
        .bind(status)
        .bind(&filter.entity_type)
        .bind(&filter.requested_by)
        .bind(filter.template_id)
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        let items = rows
            .into_iter()
            .map(WorkflowInstance::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn instance_stats(&self) -> Result<InstanceStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM workflow_instances GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        let mut stats = InstanceStats::default();
        for (status, count) in rows {
            let status: InstanceStatus = status.parse().map_err(|e: String| anyhow!(e))?;
            let count = u64::try_from(count).unwrap_or_default();
            stats.total += count;
            match status {
                InstanceStatus::Pending => stats.pending = count,
                InstanceStatus::Approved => stats.approved = count,
                InstanceStatus::Rejected => stats.rejected = count,
            }
        }
        Ok(stats)
    }

    async fn template_in_use(&self, template_id: Uuid) -> Result<bool> {
        let used: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM workflow_instances WHERE template_id = $1)",
        )
        .bind(template_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(used)
    }

    async fn pending_for(
        &self,
        user_id: Option<&str>,
        roles: &[String],
    ) -> Result<Vec<PendingApproval>> {
        let approvals = sqlx::query_as::<_, ApprovalRow>(&format!(
            r#"
            SELECT {APPROVAL_COLUMNS}
            FROM workflow_approvals
            WHERE status = 'pending'
              AND (($1::text IS NOT NULL AND assigned_to = $1)
                   OR assigned_role = ANY($2))
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .bind(roles)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?
        .into_iter()
        .map(ApprovalRecord::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

        if approvals.is_empty() {
            return Ok(Vec::new());
        }

        let instance_ids: Vec<Uuid> = approvals.iter().map(|a| a.instance_id).collect();
        let instances: HashMap<Uuid, WorkflowInstance> =
            sqlx::query_as::<_, InstanceRow>(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = ANY($1)"
            ))
            .bind(&instance_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .into_iter()
            .map(|r| WorkflowInstance::try_from(r).map(|i| (i.id, i)))
            .collect::<anyhow::Result<_>>()?;

        let template_ids: Vec<Uuid> = instances.values().map(|i| i.template_id).collect();
        let templates: HashMap<Uuid, WorkflowTemplate> =
            sqlx::query_as::<_, TemplateRow>(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE id = ANY($1)"
            ))
            .bind(&template_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?
            .into_iter()
            .map(|r| WorkflowTemplate::try_from(r).map(|t| (t.id, t)))
            .collect::<anyhow::Result<_>>()?;

        Ok(approvals
            .into_iter()
            .filter_map(|approval| {
                let instance = instances.get(&approval.instance_id)?.clone();
                let template = templates
                    .get(&instance.template_id)
                    .map(TemplateSummary::from);
                Some(PendingApproval {
                    approval,
                    instance,
                    template,
                })
            })
            .collect())
    }
}
