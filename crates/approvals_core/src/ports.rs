//! Port traits.
//!
//! The engine operates exclusively through these traits so the same logic
//! runs against `MemoryStore` (tests, local dev) and the Postgres stores.

use async_trait::async_trait;
use uuid::Uuid;

use crate::approval::{ApprovalRecord, PendingApproval};
use crate::error::Result;
use crate::events::WorkflowEvent;
use crate::instance::{InstanceFilter, InstanceStats, Page, WorkflowInstance};
use crate::template::{StepDefinition, TemplateFilter, WorkflowTemplate};
use crate::transition::DecisionPlan;

/// Persistence for workflow templates
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<()>;
    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>>;
    /// Newest first.
    async fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<WorkflowTemplate>>;
    /// Overwrite mutable fields. Returns false if the template does not exist.
    ///
    /// With `steps_changed`, fails with `InvalidState` (and writes nothing) if
    /// any instance references the template. The check and the write are one
    /// atomic unit with respect to `InstanceStore::create_instance`.
    async fn update_template(&self, template: &WorkflowTemplate, steps_changed: bool)
        -> Result<bool>;
    /// Returns false if the template does not exist.
    async fn delete_template(&self, id: Uuid) -> Result<bool>;
}

/// Persistence for instances and their approval ledger
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert the instance and its first pending record as one unit.
    ///
    /// `planned_steps` are the template steps the instance was planned
    /// against; fails with `InvalidState` if the stored template no longer
    /// has exactly those steps.
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        first: &ApprovalRecord,
        planned_steps: &[StepDefinition],
    ) -> Result<()>;

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>>;

    /// The single pending record of an instance, if any.
    async fn pending_approval(&self, instance_id: Uuid) -> Result<Option<ApprovalRecord>>;

    /// All records of an instance ordered by step index.
    async fn approvals_for(&self, instance_id: Uuid) -> Result<Vec<ApprovalRecord>>;

    /// Apply a decision all-or-nothing.
    ///
    /// Must fail with `InvalidState` (and write nothing) unless the stored
    /// instance still has `plan.expected_version` and `plan.expected_status`
    /// and the closed record is still pending.
    async fn commit_decision(&self, plan: &DecisionPlan) -> Result<()>;

    /// Newest first, paged by the filter.
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Page<WorkflowInstance>>;

    async fn instance_stats(&self) -> Result<InstanceStats>;

    /// True if any instance references the template.
    async fn template_in_use(&self, template_id: Uuid) -> Result<bool>;

    /// Pending records assigned to the user directly or to any of `roles`,
    /// newest first, joined with instance and template.
    async fn pending_for(&self, user_id: Option<&str>, roles: &[String])
        -> Result<Vec<PendingApproval>>;
}

/// Identity system view of roles
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn roles_of(&self, user_id: &str) -> Result<Vec<String>>;
    async fn members_of(&self, role: &str) -> Result<Vec<String>>;
}

/// Fire-and-forget sink for lifecycle events.
///
/// Implementations must not block and must not fail the caller.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: WorkflowEvent);
}
