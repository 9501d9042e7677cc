//! In-memory implementation of the store ports.
//!
//! All state sits behind one lock, so `commit_decision` observes and writes
//! the instance and its ledger in a single critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::approval::{ApprovalRecord, ApprovalStatus, PendingApproval, TemplateSummary};
use crate::error::{Result, WorkflowError};
use crate::instance::{InstanceFilter, InstanceStats, Page, WorkflowInstance};
use crate::ports::{InstanceStore, TemplateStore};
use crate::template::{StepDefinition, TemplateFilter, WorkflowTemplate};
use crate::transition::DecisionPlan;

#[derive(Default)]
struct State {
    templates: HashMap<Uuid, WorkflowTemplate>,
    instances: HashMap<Uuid, WorkflowInstance>,
    /// Ledger per instance, kept ordered by step index
    approvals: HashMap<Uuid, Vec<ApprovalRecord>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<()> {
        let mut state = self.state.write().await;
        if state.templates.contains_key(&template.id) {
            return Err(WorkflowError::InvalidState(format!(
                "workflow template {} already exists",
                template.id
            )));
        }
        state.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>> {
        Ok(self.state.read().await.templates.get(&id).cloned())
    }

    async fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<WorkflowTemplate>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .templates
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.code.cmp(&b.code)));
        Ok(items)
    }

    async fn update_template(
        &self,
        template: &WorkflowTemplate,
        steps_changed: bool,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if steps_changed && state.instances.values().any(|i| i.template_id == template.id) {
            return Err(WorkflowError::InvalidState(format!(
                "workflow template {} is in use; its steps can no longer change",
                template.code
            )));
        }
        match state.templates.get_mut(&template.id) {
            Some(existing) => {
                *existing = template.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.instances.values().any(|i| i.template_id == id) {
            return Err(WorkflowError::InvalidState(format!(
                "workflow template {id} is referenced by workflow instances"
            )));
        }
        Ok(state.templates.remove(&id).is_some())
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        first: &ApprovalRecord,
        planned_steps: &[StepDefinition],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.instances.contains_key(&instance.id) {
            return Err(WorkflowError::InvalidState(format!(
                "workflow instance {} already exists",
                instance.id
            )));
        }
        let template = state
            .templates
            .get(&instance.template_id)
            .ok_or_else(|| WorkflowError::template_not_found(instance.template_id))?;
        if template.steps != planned_steps {
            return Err(WorkflowError::InvalidState(format!(
                "workflow template {} changed while starting; retry",
                template.code
            )));
        }
        state.instances.insert(instance.id, instance.clone());
        state.approvals.insert(instance.id, vec![first.clone()]);
        debug!(instance_id = %instance.id, "instance created");
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>> {
        Ok(self.state.read().await.instances.get(&id).cloned())
    }

    async fn pending_approval(&self, instance_id: Uuid) -> Result<Option<ApprovalRecord>> {
        let state = self.state.read().await;
        Ok(state.approvals.get(&instance_id).and_then(|records| {
            records
                .iter()
                .find(|r| r.status == ApprovalStatus::Pending)
                .cloned()
        }))
    }

    async fn approvals_for(&self, instance_id: Uuid) -> Result<Vec<ApprovalRecord>> {
        let state = self.state.read().await;
        Ok(state.approvals.get(&instance_id).cloned().unwrap_or_default())
    }

    async fn commit_decision(&self, plan: &DecisionPlan) -> Result<()> {
        let instance_id = plan.instance_id();
        let mut state = self.state.write().await;

        let stored = state
            .instances
            .get(&instance_id)
            .ok_or_else(|| WorkflowError::instance_not_found(instance_id))?;
        if stored.version != plan.expected_version || stored.status != plan.expected_status {
            return Err(WorkflowError::stale(&stored.code));
        }

        let records = state.approvals.entry(instance_id).or_default();
        let slot = records
            .iter_mut()
            .find(|r| r.id == plan.closed.id && r.status == ApprovalStatus::Pending)
            .ok_or_else(|| WorkflowError::stale(instance_id))?;
        *slot = plan.closed.clone();
        if let Some(next) = plan.opened() {
            records.push(next.clone());
        }

        state.instances.insert(instance_id, plan.updated.clone());
        debug!(%instance_id, version = plan.updated.version, "decision committed");
        Ok(())
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Page<WorkflowInstance>> {
        let state = self.state.read().await;
        let mut matching: Vec<_> = state
            .instances
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then(a.code.cmp(&b.code)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn instance_stats(&self) -> Result<InstanceStats> {
        let state = self.state.read().await;
        let mut stats = InstanceStats::default();
        for instance in state.instances.values() {
            stats.record(instance.status);
        }
        Ok(stats)
    }

    async fn template_in_use(&self, template_id: Uuid) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.instances.values().any(|i| i.template_id == template_id))
    }

    async fn pending_for(
        &self,
        user_id: Option<&str>,
        roles: &[String],
    ) -> Result<Vec<PendingApproval>> {
        let state = self.state.read().await;
        let mut items = Vec::new();

        for records in state.approvals.values() {
            for record in records.iter().filter(|r| r.status == ApprovalStatus::Pending) {
                let for_user = user_id.is_some() && record.assigned_to.as_deref() == user_id;
                let for_role = record
                    .assigned_role
                    .as_ref()
                    .is_some_and(|role| roles.contains(role));
                if !for_user && !for_role {
                    continue;
                }
                let Some(instance) = state.instances.get(&record.instance_id) else {
                    continue;
                };
                items.push(PendingApproval {
                    approval: record.clone(),
                    instance: instance.clone(),
                    template: state
                        .templates
                        .get(&instance.template_id)
                        .map(TemplateSummary::from),
                });
            }
        }

        items.sort_by(|a, b| b.approval.created_at.cmp(&a.approval.created_at));
        Ok(items)
    }
}
