//! Database row types and their conversion into core domain types.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use approvals_core::template::{validate_steps, StepInput};
use approvals_core::{ApprovalRecord, StepDefinition, WorkflowInstance, WorkflowTemplate};

pub(crate) const TEMPLATE_COLUMNS: &str = "id, code, name, name_local, description, entity_type, \
     steps, is_active, created_by, created_at, updated_at";

pub(crate) const INSTANCE_COLUMNS: &str = "id, code, template_id, entity_type, entity_id, \
     current_step, status, priority, requested_by, requested_at, metadata, notes, \
     completed_at, completed_by, updated_at, version";

pub(crate) const APPROVAL_COLUMNS: &str = "id, instance_id, step_index, step_name, assigned_to, \
     assigned_role, status, action_by, action_at, comments, created_at";

/// Database row for workflow_templates
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TemplateRow {
    id: Uuid,
    code: String,
    name: String,
    name_local: Option<String>,
    description: Option<String>,
    entity_type: String,
    steps: serde_json::Value,
    is_active: bool,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for WorkflowTemplate {
    type Error = anyhow::Error;

    fn try_from(row: TemplateRow) -> anyhow::Result<Self> {
        let steps = steps_from_json(row.id, row.steps)?;
        Ok(Self {
            id: row.id,
            code: row.code,
            name: row.name,
            name_local: row.name_local,
            description: row.description,
            entity_type: row.entity_type,
            steps,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn steps_from_json(
    template_id: Uuid,
    value: serde_json::Value,
) -> anyhow::Result<Vec<StepDefinition>> {
    let inputs: Vec<StepInput> = serde_json::from_value(value)
        .with_context(|| format!("malformed steps on template {template_id}"))?;
    validate_steps(inputs).map_err(|e| anyhow!("invalid steps on template {template_id}: {e}"))
}

pub(crate) fn steps_json(steps: &[StepDefinition]) -> anyhow::Result<serde_json::Value> {
    serde_json::to_value(steps).context("serializing template steps")
}

/// Database row for workflow_instances
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct InstanceRow {
    id: Uuid,
    code: String,
    template_id: Uuid,
    entity_type: String,
    entity_id: String,
    current_step: i32,
    status: String,
    priority: String,
    requested_by: String,
    requested_at: DateTime<Utc>,
    metadata: serde_json::Value,
    notes: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<String>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<InstanceRow> for WorkflowInstance {
    type Error = anyhow::Error;

    fn try_from(row: InstanceRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: row.id,
            code: row.code,
            template_id: row.template_id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            current_step: u32::try_from(row.current_step)
                .with_context(|| format!("negative current_step on instance {}", row.id))?,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            priority: row.priority.parse().map_err(|e: String| anyhow!(e))?,
            requested_by: row.requested_by,
            requested_at: row.requested_at,
            metadata: row.metadata,
            notes: row.notes,
            completed_at: row.completed_at,
            completed_by: row.completed_by,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// Database row for workflow_approvals
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ApprovalRow {
    id: Uuid,
    instance_id: Uuid,
    step_index: i32,
    step_name: String,
    assigned_to: Option<String>,
    assigned_role: Option<String>,
    status: String,
    action_by: Option<String>,
    action_at: Option<DateTime<Utc>>,
    comments: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApprovalRow> for ApprovalRecord {
    type Error = anyhow::Error;

    fn try_from(row: ApprovalRow) -> anyhow::Result<Self> {
        Ok(Self {
            id: row.id,
            instance_id: row.instance_id,
            step_index: u32::try_from(row.step_index)
                .with_context(|| format!("negative step_index on approval {}", row.id))?,
            step_name: row.step_name,
            assigned_to: row.assigned_to,
            assigned_role: row.assigned_role,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            action_by: row.action_by,
            action_at: row.action_at,
            comments: row.comments,
            created_at: row.created_at,
        })
    }
}

/// Step indexes are bounded by template length, far below i32::MAX.
pub(crate) fn to_db_index(value: u32) -> anyhow::Result<i32> {
    i32::try_from(value).map_err(|_| anyhow!("step index {value} out of range"))
}
