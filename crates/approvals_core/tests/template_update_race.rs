//! A steps update racing a workflow start on the same template.
//!
//! Each gated store parks its caller just before the write reaches the inner
//! store, so the other operation lands in between. Whichever side writes
//! second must refuse; an instance never ends up planned against steps the
//! template no longer has.

use std::sync::Arc;

use approvals_core::{
    ApprovalEngine, ApprovalRecord, DecisionPlan, DecisionRequest, InstanceFilter,
    InstanceStats, InstanceStatus, InstanceStore, MemoryStore, NewTemplate, NoopNotifier,
    Outcome, Page, PendingApproval, StartRequest, StaticRoleDirectory, StepDefinition, StepInput,
    TemplateFilter, TemplatePatch, TemplateStore, WorkflowError, WorkflowInstance,
    WorkflowTemplate,
};
use async_trait::async_trait;
use tokio::sync::Barrier;
use uuid::Uuid;

/// Parks the caller between `reached` and `release`
struct Gate {
    reached: Barrier,
    release: Barrier,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            reached: Barrier::new(2),
            release: Barrier::new(2),
        })
    }

    async fn hold(&self) {
        self.reached.wait().await;
        self.release.wait().await;
    }
}

struct GatedTemplates {
    inner: Arc<MemoryStore>,
    gate: Arc<Gate>,
}

#[async_trait]
impl TemplateStore for GatedTemplates {
    async fn insert_template(&self, template: &WorkflowTemplate) -> approvals_core::Result<()> {
        self.inner.insert_template(template).await
    }

    async fn get_template(&self, id: Uuid) -> approvals_core::Result<Option<WorkflowTemplate>> {
        self.inner.get_template(id).await
    }

    async fn list_templates(
        &self,
        filter: &TemplateFilter,
    ) -> approvals_core::Result<Vec<WorkflowTemplate>> {
        self.inner.list_templates(filter).await
    }

    async fn update_template(
        &self,
        template: &WorkflowTemplate,
        steps_changed: bool,
    ) -> approvals_core::Result<bool> {
        self.gate.hold().await;
        self.inner.update_template(template, steps_changed).await
    }

    async fn delete_template(&self, id: Uuid) -> approvals_core::Result<bool> {
        self.inner.delete_template(id).await
    }
}

struct GatedInstances {
    inner: Arc<MemoryStore>,
    gate: Arc<Gate>,
}

#[async_trait]
impl InstanceStore for GatedInstances {
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
        first: &ApprovalRecord,
        planned_steps: &[StepDefinition],
    ) -> approvals_core::Result<()> {
        self.gate.hold().await;
        self.inner.create_instance(instance, first, planned_steps).await
    }

    async fn get_instance(&self, id: Uuid) -> approvals_core::Result<Option<WorkflowInstance>> {
        self.inner.get_instance(id).await
    }

    async fn pending_approval(
        &self,
        instance_id: Uuid,
    ) -> approvals_core::Result<Option<ApprovalRecord>> {
        self.inner.pending_approval(instance_id).await
    }

    async fn approvals_for(&self, instance_id: Uuid) -> approvals_core::Result<Vec<ApprovalRecord>> {
        self.inner.approvals_for(instance_id).await
    }

    async fn commit_decision(&self, plan: &DecisionPlan) -> approvals_core::Result<()> {
        self.inner.commit_decision(plan).await
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
    ) -> approvals_core::Result<Page<WorkflowInstance>> {
        self.inner.list_instances(filter).await
    }

    async fn instance_stats(&self) -> approvals_core::Result<InstanceStats> {
        self.inner.instance_stats().await
    }

    async fn template_in_use(&self, template_id: Uuid) -> approvals_core::Result<bool> {
        self.inner.template_in_use(template_id).await
    }

    async fn pending_for(
        &self,
        user_id: Option<&str>,
        roles: &[String],
    ) -> approvals_core::Result<Vec<PendingApproval>> {
        self.inner.pending_for(user_id, roles).await
    }
}

fn engine_over(store: Arc<MemoryStore>) -> ApprovalEngine {
    ApprovalEngine::new(
        store.clone(),
        store,
        Arc::new(StaticRoleDirectory::new()),
        Arc::new(NoopNotifier),
    )
}

async fn seed_template(engine: &ApprovalEngine) -> Uuid {
    engine
        .create_template(NewTemplate {
            name: "Travel approval".to_string(),
            entity_type: "travel_request".to_string(),
            steps: vec![
                StepInput {
                    name: "Manager".to_string(),
                    assignee_id: Some("u-manager".to_string()),
                    assignee_role: None,
                },
                StepInput {
                    name: "Finance".to_string(),
                    assignee_id: None,
                    assignee_role: Some("finance".to_string()),
                },
            ],
            ..NewTemplate::default()
        })
        .await
        .unwrap()
        .id
}

fn start_request(template_id: Uuid) -> StartRequest {
    StartRequest {
        template_id,
        entity_id: "TR-5".to_string(),
        requested_by: "u-clerk".to_string(),
        ..StartRequest::default()
    }
}

fn single_step_patch() -> TemplatePatch {
    TemplatePatch {
        steps: Some(vec![StepInput {
            name: "Director".to_string(),
            assignee_id: Some("u-director".to_string()),
            assignee_role: None,
        }]),
        ..TemplatePatch::default()
    }
}

#[tokio::test]
async fn test_start_landing_mid_update_freezes_steps() {
    let inner = Arc::new(MemoryStore::new());
    let plain = engine_over(inner.clone());
    let template_id = seed_template(&plain).await;

    let gate = Gate::new();
    let updating = ApprovalEngine::new(
        Arc::new(GatedTemplates {
            inner: inner.clone(),
            gate: gate.clone(),
        }),
        inner.clone(),
        Arc::new(StaticRoleDirectory::new()),
        Arc::new(NoopNotifier),
    );

    let (update, instance_id) = tokio::join!(
        updating.update_template(template_id, single_step_patch()),
        async {
            gate.reached.wait().await;
            let id = plain.start(start_request(template_id)).await.unwrap().id;
            plain
                .approve(id, DecisionRequest::by("u-manager"))
                .await
                .unwrap();
            gate.release.wait().await;
            id
        },
    );

    assert!(matches!(update, Err(WorkflowError::InvalidState(_))));
    assert_eq!(plain.get_template(template_id).await.unwrap().step_count(), 2);

    let last = plain
        .approve(instance_id, DecisionRequest::by("u-fin"))
        .await
        .unwrap();
    assert_eq!(last.outcome, Outcome::Completed);
    assert_eq!(last.instance.status, InstanceStatus::Approved);
}

#[tokio::test]
async fn test_update_landing_mid_start_refuses_start() {
    let inner = Arc::new(MemoryStore::new());
    let plain = engine_over(inner.clone());
    let template_id = seed_template(&plain).await;

    let gate = Gate::new();
    let starting = ApprovalEngine::new(
        inner.clone(),
        Arc::new(GatedInstances {
            inner: inner.clone(),
            gate: gate.clone(),
        }),
        Arc::new(StaticRoleDirectory::new()),
        Arc::new(NoopNotifier),
    );

    let (started, updated) = tokio::join!(starting.start(start_request(template_id)), async {
        gate.reached.wait().await;
        let updated = plain
            .update_template(template_id, single_step_patch())
            .await;
        gate.release.wait().await;
        updated
    });

    assert_eq!(updated.unwrap().step_count(), 1);
    assert!(matches!(started, Err(WorkflowError::InvalidState(_))));
    assert_eq!(
        plain
            .list_instances(&InstanceFilter::default())
            .await
            .unwrap()
            .total,
        0
    );

    // A retry plans against the new steps and goes through.
    let id = plain.start(start_request(template_id)).await.unwrap().id;
    let done = plain
        .approve(id, DecisionRequest::by("u-director"))
        .await
        .unwrap();
    assert_eq!(done.outcome, Outcome::Completed);
}
