//! Approval Engine
//!
//! Drives templates and instances through the store ports. Every decision is
//! planned by [`plan_decision`] and committed by the store behind a version
//! check; events go out only after the commit succeeds.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::{
    ApprovalStatus, DecisionRequest, InstanceDetail, PendingApproval, PendingQuery, Verdict,
};
use crate::error::{Result, WorkflowError};
use crate::events::{NoopNotifier, WorkflowEvent};
use crate::instance::{
    Created, InstanceFilter, InstanceStats, Page, StartRequest, WorkflowInstance,
};
use crate::ports::{InstanceStore, Notifier, RoleDirectory, TemplateStore};
use crate::roles::StaticRoleDirectory;
use crate::store_memory::MemoryStore;
use crate::template::{
    required, Assignee, NewTemplate, TemplateFilter, TemplatePatch, WorkflowTemplate,
};
use crate::transition::{plan_decision, plan_start, DecisionPlan, Outcome};

/// Result of a committed approve or reject
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub instance: WorkflowInstance,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// The approval engine
#[derive(Clone)]
pub struct ApprovalEngine {
    templates: Arc<dyn TemplateStore>,
    instances: Arc<dyn InstanceStore>,
    roles: Arc<dyn RoleDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalEngine {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        instances: Arc<dyn InstanceStore>,
        roles: Arc<dyn RoleDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            templates,
            instances,
            roles,
            notifier,
        }
    }

    /// Engine over a fresh [`MemoryStore`] with no roles and no notifications.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            store.clone(),
            store,
            Arc::new(StaticRoleDirectory::new()),
            Arc::new(NoopNotifier),
        )
    }

    pub fn with_roles(mut self, roles: Arc<dyn RoleDirectory>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    pub async fn create_template(&self, input: NewTemplate) -> Result<Created> {
        let template = input.into_template(Utc::now())?;
        self.templates.insert_template(&template).await?;

        info!(
            template_id = %template.id,
            code = %template.code,
            entity_type = %template.entity_type,
            steps = template.step_count(),
            "workflow template created"
        );
        Ok(Created {
            id: template.id,
            code: template.code,
        })
    }

    pub async fn get_template(&self, id: Uuid) -> Result<WorkflowTemplate> {
        self.templates
            .get_template(id)
            .await?
            .ok_or_else(|| WorkflowError::template_not_found(id))
    }

    pub async fn list_templates(&self, filter: &TemplateFilter) -> Result<Vec<WorkflowTemplate>> {
        self.templates.list_templates(filter).await
    }

    /// Apply a partial update. Steps are frozen once any instance uses the template.
    pub async fn update_template(&self, id: Uuid, patch: TemplatePatch) -> Result<WorkflowTemplate> {
        let existing = self.get_template(id).await?;
        let steps_changed = patch.changes_steps();
        let updated = patch.apply(existing, Utc::now())?;
        if !self.templates.update_template(&updated, steps_changed).await? {
            return Err(WorkflowError::template_not_found(id));
        }
        info!(template_id = %id, active = updated.is_active, "workflow template updated");
        Ok(updated)
    }

    pub async fn delete_template(&self, id: Uuid) -> Result<()> {
        let existing = self.get_template(id).await?;
        if self.instances.template_in_use(id).await? {
            return Err(WorkflowError::InvalidState(format!(
                "workflow template {} is referenced by workflow instances",
                existing.code
            )));
        }
        if !self.templates.delete_template(id).await? {
            return Err(WorkflowError::template_not_found(id));
        }
        info!(template_id = %id, code = %existing.code, "workflow template deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Start a workflow for a business entity at step 0.
    pub async fn start(&self, req: StartRequest) -> Result<Created> {
        let template = self.get_template(req.template_id).await?;
        let now = Utc::now();
        let (instance, first) = plan_start(&template, req, now)?;

        self.instances
            .create_instance(&instance, &first, &template.steps)
            .await?;

        info!(
            instance_id = %instance.id,
            code = %instance.code,
            template = %template.code,
            entity_type = %instance.entity_type,
            entity_id = %instance.entity_id,
            "workflow started"
        );
        self.notifier.publish(WorkflowEvent::Started {
            instance_id: instance.id,
            template_id: template.id,
            entity_type: instance.entity_type.clone(),
            entity_id: instance.entity_id.clone(),
            requested_by: instance.requested_by.clone(),
            at: now,
        });

        Ok(Created {
            id: instance.id,
            code: instance.code,
        })
    }

    pub async fn approve(&self, instance_id: Uuid, req: DecisionRequest) -> Result<Decision> {
        self.decide(instance_id, Verdict::Approve, req).await
    }

    pub async fn reject(&self, instance_id: Uuid, req: DecisionRequest) -> Result<Decision> {
        self.decide(instance_id, Verdict::Reject, req).await
    }

    async fn decide(
        &self,
        instance_id: Uuid,
        verdict: Verdict,
        req: DecisionRequest,
    ) -> Result<Decision> {
        let instance = self.load_instance(instance_id).await?;
        let template = self.get_template(instance.template_id).await?;
        let current = self.instances.pending_approval(instance_id).await?;

        let plan = plan_decision(&instance, &template, current, verdict, &req, Utc::now())
            .inspect_err(|e| {
                warn!(%instance_id, ?verdict, error = %e, "decision refused");
            })?;

        if let Err(e) = self.instances.commit_decision(&plan).await {
            warn!(
                %instance_id,
                expected_version = plan.expected_version,
                error = %e,
                "decision commit failed"
            );
            return Err(e);
        }

        debug!(
            %instance_id,
            step = plan.closed.step_index,
            version = plan.updated.version,
            "decision committed"
        );
        self.publish_outcome(&plan);

        Ok(Decision {
            instance: plan.updated,
            outcome: plan.outcome,
        })
    }

    fn publish_outcome(&self, plan: &DecisionPlan) {
        let instance = &plan.updated;
        let actor = plan.closed.action_by.clone().unwrap_or_default();
        let at = plan.closed.action_at.unwrap_or(instance.updated_at);

        let event = match &plan.outcome {
            Outcome::Advanced { next } => {
                info!(
                    instance_id = %instance.id,
                    from_step = plan.closed.step_index,
                    to_step = next.step_index,
                    "workflow advanced"
                );
                WorkflowEvent::StepAdvanced {
                    instance_id: instance.id,
                    from_step: plan.closed.step_index,
                    to_step: next.step_index,
                    step_name: next.step_name.clone(),
                    assigned_to: next.assigned_to.clone(),
                    assigned_role: next.assigned_role.clone(),
                    approved_by: actor,
                    at,
                }
            }
            Outcome::Completed => {
                info!(instance_id = %instance.id, code = %instance.code, "workflow approved");
                WorkflowEvent::Completed {
                    instance_id: instance.id,
                    entity_type: instance.entity_type.clone(),
                    entity_id: instance.entity_id.clone(),
                    completed_by: actor,
                    at,
                }
            }
            Outcome::Rejected => {
                info!(
                    instance_id = %instance.id,
                    code = %instance.code,
                    step = plan.closed.step_index,
                    "workflow rejected"
                );
                WorkflowEvent::Rejected {
                    instance_id: instance.id,
                    entity_type: instance.entity_type.clone(),
                    entity_id: instance.entity_id.clone(),
                    step_index: plan.closed.step_index,
                    rejected_by: actor,
                    comments: plan.closed.comments.clone(),
                    at,
                }
            }
        };
        self.notifier.publish(event);
    }

    async fn load_instance(&self, id: Uuid) -> Result<WorkflowInstance> {
        self.instances
            .get_instance(id)
            .await?
            .ok_or_else(|| WorkflowError::instance_not_found(id))
    }

    /// Instance with its template and full ledger ordered by step.
    pub async fn get_instance(&self, id: Uuid) -> Result<InstanceDetail> {
        let instance = self.load_instance(id).await?;
        let template = self.templates.get_template(instance.template_id).await?;
        let approvals = self.instances.approvals_for(id).await?;
        let current_approvers = match approvals
            .iter()
            .find(|r| r.status == ApprovalStatus::Pending)
        {
            Some(record) => match record.assignee()? {
                Assignee::User(user_id) => vec![user_id],
                Assignee::Role(role) => self.roles.members_of(&role).await?,
            },
            None => Vec::new(),
        };
        Ok(InstanceDetail {
            instance,
            template,
            approvals,
            current_approvers,
        })
    }

    pub async fn list_instances(&self, filter: &InstanceFilter) -> Result<Page<WorkflowInstance>> {
        self.instances.list_instances(filter).await
    }

    pub async fn instance_stats(&self) -> Result<InstanceStats> {
        self.instances.instance_stats().await
    }

    /// Pending work for a user (direct plus held roles) or for one role.
    pub async fn pending_for(&self, query: PendingQuery) -> Result<Vec<PendingApproval>> {
        match query {
            PendingQuery::User(user_id) => {
                let user_id = required("user_id", user_id)?;
                let roles = self.roles.roles_of(&user_id).await?;
                debug!(%user_id, roles = ?roles, "resolving pending approvals");
                self.instances.pending_for(Some(&user_id), &roles).await
            }
            PendingQuery::Role(role) => {
                let role = required("role", role)?;
                self.instances.pending_for(None, &[role]).await
            }
        }
    }
}
