//! Decision planning.
//!
//! Pure functions that turn (instance, template, current approval, verdict)
//! into the complete set of writes a store must commit atomically. Nothing
//! here touches storage; the store only checks `expected_version` and applies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::approval::{ApprovalRecord, ApprovalStatus, DecisionRequest, Verdict};
use crate::code::{human_code, INSTANCE_CODE_PREFIX};
use crate::error::{Result, WorkflowError};
use crate::instance::{InstanceStatus, StartRequest, WorkflowInstance};
use crate::template::{non_blank, required, WorkflowTemplate};

/// What a committed decision did to the instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    /// Moved to the next step; `next` is the new pending record.
    Advanced { next: ApprovalRecord },
    /// Last step approved; instance is now approved.
    Completed,
    /// Instance is now rejected.
    Rejected,
}

/// Writes for one decision, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct DecisionPlan {
    /// Version the engine read; the commit fails if the row moved on.
    pub expected_version: i64,
    /// Status the engine read (always `Pending`).
    pub expected_status: InstanceStatus,
    /// The current record with its decision filled in
    pub closed: ApprovalRecord,
    pub outcome: Outcome,
    /// Instance after the decision (version already bumped)
    pub updated: WorkflowInstance,
}

impl DecisionPlan {
    pub fn instance_id(&self) -> Uuid {
        self.updated.id
    }

    /// Record opened by this decision, if any.
    pub fn opened(&self) -> Option<&ApprovalRecord> {
        match &self.outcome {
            Outcome::Advanced { next } => Some(next),
            Outcome::Completed | Outcome::Rejected => None,
        }
    }
}

/// Build the instance and its step-0 record for `start`.
pub fn plan_start(
    template: &WorkflowTemplate,
    req: StartRequest,
    now: DateTime<Utc>,
) -> Result<(WorkflowInstance, ApprovalRecord)> {
    if !template.is_active {
        return Err(WorkflowError::InvalidState(format!(
            "workflow template {} is inactive",
            template.code
        )));
    }
    let first = template.step(0).ok_or_else(|| {
        WorkflowError::Validation(format!(
            "workflow template {} has no steps",
            template.code
        ))
    })?;
    let entity_id = required("entity_id", req.entity_id)?;
    let requested_by = required("requested_by", req.requested_by)?;
    let entity_type =
        non_blank(req.entity_type).unwrap_or_else(|| template.entity_type.clone());

    let id = Uuid::new_v4();
    let instance = WorkflowInstance {
        id,
        code: human_code(INSTANCE_CODE_PREFIX, now, id),
        template_id: template.id,
        entity_type,
        entity_id,
        current_step: 0,
        status: InstanceStatus::Pending,
        priority: req.priority.unwrap_or_default(),
        requested_by,
        requested_at: now,
        metadata: req.metadata.unwrap_or(serde_json::Value::Null),
        notes: non_blank(req.notes),
        completed_at: None,
        completed_by: None,
        updated_at: now,
        version: 0,
    };
    let record = ApprovalRecord::open(id, 0, first, now);
    Ok((instance, record))
}

/// Plan an approve or reject of the instance's current step.
pub fn plan_decision(
    instance: &WorkflowInstance,
    template: &WorkflowTemplate,
    current: Option<ApprovalRecord>,
    verdict: Verdict,
    req: &DecisionRequest,
    now: DateTime<Utc>,
) -> Result<DecisionPlan> {
    instance.ensure_pending()?;
    let actor = required("user_id", req.user_id.clone())?;

    if let Some(expected) = req.expected_step {
        if expected != instance.current_step {
            return Err(WorkflowError::InvalidState(format!(
                "workflow instance {} is at step {}, not step {}",
                instance.code, instance.current_step, expected
            )));
        }
    }

    if !template
        .last_step_index()
        .is_some_and(|last| instance.current_step <= last)
    {
        return Err(WorkflowError::InvalidState(format!(
            "workflow instance {} points at step {} but template {} has {} step(s)",
            instance.code,
            instance.current_step,
            template.code,
            template.step_count()
        )));
    }

    let mut closed = match current {
        Some(record)
            if record.step_index == instance.current_step
                && record.status == ApprovalStatus::Pending =>
        {
            record
        }
        _ => {
            return Err(WorkflowError::InvalidState(format!(
                "workflow instance {} has no pending approval for step {}",
                instance.code, instance.current_step
            )))
        }
    };
    closed.decide(verdict, &actor, non_blank(req.comments.clone()), now)?;

    let mut updated = instance.clone();
    updated.updated_at = now;
    updated.version = instance.version + 1;

    let outcome = match verdict {
        Verdict::Approve => {
            let next_index = instance.current_step + 1;
            match template.step(next_index) {
                Some(step) => {
                    updated.current_step = next_index;
                    Outcome::Advanced {
                        next: ApprovalRecord::open(instance.id, next_index, step, now),
                    }
                }
                None => {
                    updated.status = instance.status.transition(InstanceStatus::Approved)?;
                    updated.completed_at = Some(now);
                    updated.completed_by = Some(actor);
                    Outcome::Completed
                }
            }
        }
        Verdict::Reject => {
            updated.status = instance.status.transition(InstanceStatus::Rejected)?;
            updated.completed_at = Some(now);
            updated.completed_by = Some(actor);
            Outcome::Rejected
        }
    };

    Ok(DecisionPlan {
        expected_version: instance.version,
        expected_status: instance.status,
        closed,
        outcome,
        updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{NewTemplate, StepInput};

    fn template(steps: &[(&str, &str)]) -> WorkflowTemplate {
        NewTemplate {
            name: "Purchase approval".to_string(),
            entity_type: "purchase_requisition".to_string(),
            steps: steps
                .iter()
                .map(|(name, user)| StepInput {
                    name: name.to_string(),
                    assignee_id: Some(user.to_string()),
                    assignee_role: None,
                })
                .collect(),
            ..NewTemplate::default()
        }
        .into_template(Utc::now())
        .unwrap()
    }

    fn start(t: &WorkflowTemplate) -> (WorkflowInstance, ApprovalRecord) {
        plan_start(
            t,
            StartRequest {
                template_id: t.id,
                entity_id: "PR-7".to_string(),
                requested_by: "u-clerk".to_string(),
                ..StartRequest::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_plan_start_defaults() {
        let t = template(&[("Manager", "u-m")]);
        let (instance, record) = start(&t);

        assert_eq!(instance.entity_type, "purchase_requisition");
        assert_eq!(instance.current_step, 0);
        assert_eq!(instance.status, InstanceStatus::Pending);
        assert!(instance.code.starts_with("WF-"));
        assert_eq!(record.instance_id, instance.id);
        assert_eq!(record.step_index, 0);
        assert_eq!(record.assigned_to.as_deref(), Some("u-m"));
    }

    #[test]
    fn test_plan_start_inactive_template() {
        let mut t = template(&[("Manager", "u-m")]);
        t.is_active = false;

        let err = plan_start(
            &t,
            StartRequest {
                template_id: t.id,
                entity_id: "PR-7".to_string(),
                requested_by: "u-clerk".to_string(),
                ..StartRequest::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }

    #[test]
    fn test_plan_start_zero_steps() {
        let mut t = template(&[("Manager", "u-m")]);
        t.steps.clear();

        let err = plan_start(
            &t,
            StartRequest {
                template_id: t.id,
                entity_id: "PR-7".to_string(),
                requested_by: "u-clerk".to_string(),
                ..StartRequest::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_approve_advances() {
        let t = template(&[("Manager", "u-m"), ("Finance", "u-f")]);
        let (instance, record) = start(&t);

        let plan = plan_decision(
            &instance,
            &t,
            Some(record),
            Verdict::Approve,
            &DecisionRequest::by("u-m"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.expected_version, 0);
        assert_eq!(plan.updated.version, 1);
        assert_eq!(plan.updated.current_step, 1);
        assert_eq!(plan.updated.status, InstanceStatus::Pending);
        assert_eq!(plan.closed.status, ApprovalStatus::Approved);
        let next = plan.opened().unwrap();
        assert_eq!(next.step_index, 1);
        assert_eq!(next.step_name, "Finance");
    }

    #[test]
    fn test_approve_last_step_completes() {
        let t = template(&[("Manager", "u-m")]);
        let (instance, record) = start(&t);

        let plan = plan_decision(
            &instance,
            &t,
            Some(record),
            Verdict::Approve,
            &DecisionRequest::by("u-m"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.outcome, Outcome::Completed);
        assert_eq!(plan.updated.status, InstanceStatus::Approved);
        assert_eq!(plan.updated.completed_by.as_deref(), Some("u-m"));
        assert!(plan.updated.completed_at.is_some());
        assert!(plan.opened().is_none());
    }

    #[test]
    fn test_reject_terminates() {
        let t = template(&[("Manager", "u-m"), ("Finance", "u-f")]);
        let (instance, record) = start(&t);

        let plan = plan_decision(
            &instance,
            &t,
            Some(record),
            Verdict::Reject,
            &DecisionRequest::by("u-m").with_comments("over budget"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.outcome, Outcome::Rejected);
        assert_eq!(plan.updated.status, InstanceStatus::Rejected);
        assert_eq!(plan.updated.current_step, 0);
        assert_eq!(plan.closed.comments.as_deref(), Some("over budget"));
    }

    #[test]
    fn test_stale_expected_step() {
        let t = template(&[("Manager", "u-m"), ("Finance", "u-f")]);
        let (instance, record) = start(&t);

        let err = plan_decision(
            &instance,
            &t,
            Some(record),
            Verdict::Approve,
            &DecisionRequest::by("u-m").at_step(1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }

    #[test]
    fn test_missing_pending_record() {
        let t = template(&[("Manager", "u-m")]);
        let (instance, _) = start(&t);

        let err = plan_decision(
            &instance,
            &t,
            None,
            Verdict::Approve,
            &DecisionRequest::by("u-m"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }

    #[test]
    fn test_terminal_instance_refused() {
        let t = template(&[("Manager", "u-m")]);
        let (mut instance, record) = start(&t);
        instance.status = InstanceStatus::Rejected;

        let err = plan_decision(
            &instance,
            &t,
            Some(record),
            Verdict::Approve,
            &DecisionRequest::by("u-m"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }

    #[test]
    fn test_blank_actor_refused() {
        let t = template(&[("Manager", "u-m")]);
        let (instance, record) = start(&t);

        let err = plan_decision(
            &instance,
            &t,
            Some(record),
            Verdict::Approve,
            &DecisionRequest::by(" "),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_step_beyond_template_refused() {
        let two = template(&[("Manager", "u-m"), ("Finance", "u-f")]);
        let (mut instance, mut record) = start(&two);
        instance.current_step = 1;
        record.step_index = 1;

        let shrunk = template(&[("Manager", "u-m")]);
        let err = plan_decision(
            &instance,
            &shrunk,
            Some(record),
            Verdict::Approve,
            &DecisionRequest::by("u-f"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }
}
