//! Integration tests for the Postgres stores.
//!
//! These tests verify that:
//! 1. Instances and their first approval are created together
//! 2. Decisions commit behind the version check
//! 3. A template referenced by an instance cannot be deleted
//!
//! Requires: DATABASE_URL environment variable. Run with `--ignored`.

use std::sync::Arc;

use sqlx::PgPool;

use approvals_core::{
    plan_decision, ApprovalEngine, ApprovalStatus, DecisionRequest, InstanceFilter,
    InstanceStatus, InstanceStore, NewTemplate, NoopNotifier, PendingQuery, StartRequest,
    StaticRoleDirectory, StepInput, TemplateFilter, Verdict, WorkflowError,
};
use approvals_postgres::{migrate, PgStores};

/// Helper to get a migrated test database pool
async fn get_test_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    migrate(&pool).await.expect("Failed to run migrations");
    pool
}

fn engine(pool: &PgPool) -> (ApprovalEngine, PgStores) {
    let stores = PgStores::new(pool.clone());
    let engine = ApprovalEngine::new(
        stores.templates.clone(),
        stores.instances.clone(),
        Arc::new(StaticRoleDirectory::new().with_member("pg-test-finance", "u-pg-fin")),
        Arc::new(NoopNotifier),
    );
    (engine, stores)
}

/// Entity type unique to one test run so parallel runs do not collide.
fn entity_type() -> String {
    format!("pg_test_{}", uuid::Uuid::new_v4().simple())
}

async fn two_step_template(engine: &ApprovalEngine, entity_type: &str) -> uuid::Uuid {
    engine
        .create_template(NewTemplate {
            name: "PG purchase approval".to_string(),
            entity_type: entity_type.to_string(),
            steps: vec![
                StepInput {
                    name: "Manager".to_string(),
                    assignee_id: Some("u-pg-manager".to_string()),
                    assignee_role: None,
                },
                StepInput {
                    name: "Finance".to_string(),
                    assignee_id: None,
                    assignee_role: Some("pg-test-finance".to_string()),
                },
            ],
            ..NewTemplate::default()
        })
        .await
        .expect("create template")
        .id
}

async fn start(engine: &ApprovalEngine, template_id: uuid::Uuid) -> uuid::Uuid {
    engine
        .start(StartRequest {
            template_id,
            entity_id: "PR-PG-1".to_string(),
            requested_by: "u-pg-clerk".to_string(),
            ..StartRequest::default()
        })
        .await
        .expect("start")
        .id
}

#[tokio::test]
#[ignore]
async fn test_full_approval_path() {
    let pool = get_test_pool().await;
    let (engine, _) = engine(&pool);
    let entity_type = entity_type();
    let template_id = two_step_template(&engine, &entity_type).await;

    let listed = engine
        .list_templates(&TemplateFilter {
            entity_type: Some(entity_type.clone()),
            ..TemplateFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].step_count(), 2);

    let id = start(&engine, template_id).await;
    engine
        .approve(id, DecisionRequest::by("u-pg-manager"))
        .await
        .unwrap();

    let for_fin = engine
        .pending_for(PendingQuery::User("u-pg-fin".to_string()))
        .await
        .unwrap();
    assert!(for_fin.iter().any(|p| p.instance.id == id));

    engine
        .approve(id, DecisionRequest::by("u-pg-fin"))
        .await
        .unwrap();

    let detail = engine.get_instance(id).await.unwrap();
    assert_eq!(detail.instance.status, InstanceStatus::Approved);
    assert_eq!(detail.instance.version, 2);
    assert_eq!(detail.approvals.len(), 2);
    assert!(detail
        .approvals
        .iter()
        .all(|r| r.status == ApprovalStatus::Approved));

    let page = engine
        .list_instances(&InstanceFilter {
            entity_type: Some(entity_type),
            ..InstanceFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
#[ignore]
async fn test_reject_then_decide_again_fails() {
    let pool = get_test_pool().await;
    let (engine, _) = engine(&pool);
    let template_id = two_step_template(&engine, &entity_type()).await;
    let id = start(&engine, template_id).await;

    engine
        .reject(id, DecisionRequest::by("u-pg-manager").with_comments("no"))
        .await
        .unwrap();
    let err = engine
        .approve(id, DecisionRequest::by("u-pg-manager"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    let detail = engine.get_instance(id).await.unwrap();
    assert_eq!(detail.instance.status, InstanceStatus::Rejected);
    assert_eq!(detail.approvals.len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_stale_plan_loses_version_check() {
    let pool = get_test_pool().await;
    let (engine, stores) = engine(&pool);
    let template_id = two_step_template(&engine, &entity_type()).await;
    let id = start(&engine, template_id).await;

    let instance = stores.instances.get_instance(id).await.unwrap().unwrap();
    let template = engine.get_template(template_id).await.unwrap();
    let current = stores.instances.pending_approval(id).await.unwrap();

    let plan = |verdict| {
        plan_decision(
            &instance,
            &template,
            current.clone(),
            verdict,
            &DecisionRequest::by("u-pg-manager"),
            chrono::Utc::now(),
        )
        .unwrap()
    };
    let first = plan(Verdict::Approve);
    let second = plan(Verdict::Reject);

    let (a, b) = tokio::join!(
        stores.instances.commit_decision(&first),
        stores.instances.commit_decision(&second),
    );
    assert_ne!(a.is_ok(), b.is_ok());

    let approvals = stores.instances.approvals_for(id).await.unwrap();
    let pending = approvals
        .iter()
        .filter(|r| r.status == ApprovalStatus::Pending)
        .count();
    assert!(pending <= 1);
}

#[tokio::test]
#[ignore]
async fn test_template_in_use_cannot_be_deleted() {
    let pool = get_test_pool().await;
    let (engine, stores) = engine(&pool);
    let template_id = two_step_template(&engine, &entity_type()).await;
    start(&engine, template_id).await;

    let err = engine.delete_template(template_id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));

    // Store-level backstop
    use approvals_core::TemplateStore;
    let err = stores.templates.delete_template(template_id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));
}

#[tokio::test]
#[ignore]
async fn test_steps_frozen_by_store_and_start_rechecks_steps() {
    use approvals_core::TemplateStore;

    let pool = get_test_pool().await;
    let (engine, stores) = engine(&pool);

    let used_id = two_step_template(&engine, &entity_type()).await;
    start(&engine, used_id).await;
    let mut shrunk = engine.get_template(used_id).await.unwrap();
    shrunk.steps.truncate(1);
    let err = stores
        .templates
        .update_template(&shrunk, true)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));
    assert_eq!(engine.get_template(used_id).await.unwrap().step_count(), 2);

    // Instance planned against steps that were replaced before it landed.
    let fresh_id = two_step_template(&engine, &entity_type()).await;
    let planned = engine.get_template(fresh_id).await.unwrap();
    let (instance, first) = approvals_core::plan_start(
        &planned,
        StartRequest {
            template_id: fresh_id,
            entity_id: "PR-PG-2".to_string(),
            requested_by: "u-pg-clerk".to_string(),
            ..StartRequest::default()
        },
        chrono::Utc::now(),
    )
    .unwrap();
    let mut replaced = planned.clone();
    replaced.steps.truncate(1);
    assert!(stores
        .templates
        .update_template(&replaced, true)
        .await
        .unwrap());

    let err = stores
        .instances
        .create_instance(&instance, &first, &planned.steps)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));
    assert!(stores
        .instances
        .get_instance(instance.id)
        .await
        .unwrap()
        .is_none());
}
