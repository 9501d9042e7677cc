//! Approval Ledger Types
//!
//! One record per step execution. A record is created pending when its
//! instance enters the step and decided exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::instance::WorkflowInstance;
use crate::template::{Assignee, StepDefinition, WorkflowTemplate};

/// Decision status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown approval status: {}", s)),
        }
    }
}

/// What the acting user decided on the current step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    pub fn as_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// Decision record for one step of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub step_index: u32,
    /// Copy of the template step name at creation time
    pub step_name: String,
    /// Set when the step is owned by a user
    pub assigned_to: Option<String>,
    /// Set when the step is owned by a role
    pub assigned_role: Option<String>,
    pub status: ApprovalStatus,
    pub action_by: Option<String>,
    pub action_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    /// Open a pending record for `step` at `step_index`.
    pub fn open(instance_id: Uuid, step_index: u32, step: &StepDefinition, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            step_index,
            step_name: step.name.clone(),
            assigned_to: step.assignee.user_id().map(str::to_string),
            assigned_role: step.assignee.role().map(str::to_string),
            status: ApprovalStatus::Pending,
            action_by: None,
            action_at: None,
            comments: None,
            created_at: now,
        }
    }

    pub fn assignee(&self) -> Result<Assignee> {
        Assignee::from_parts(self.assigned_to.clone(), self.assigned_role.clone())
    }

    /// Record the decision. A record is decided exactly once.
    pub fn decide(
        &mut self,
        verdict: Verdict,
        actor: &str,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_decided() {
            return Err(WorkflowError::InvalidState(format!(
                "step {} ({}) was already {}",
                self.step_index, self.step_name, self.status
            )));
        }
        self.status = verdict.as_status();
        self.action_by = Some(actor.to_string());
        self.action_at = Some(at);
        self.comments = comments;
        Ok(())
    }
}

/// Caller input for approve/reject
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DecisionRequest {
    pub user_id: String,
    #[serde(default)]
    pub comments: Option<String>,
    /// Step the caller believes is current; a mismatch is a stale view
    #[serde(default)]
    pub expected_step: Option<u32>,
}

impl DecisionRequest {
    pub fn by(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn at_step(mut self, step: u32) -> Self {
        self.expected_step = Some(step);
        self
    }
}

/// Who is asking for their pending approvals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingQuery {
    User(String),
    Role(String),
}

/// Compact template view attached to listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub name_local: Option<String>,
    pub entity_type: String,
    pub step_count: u32,
}

impl From<&WorkflowTemplate> for TemplateSummary {
    fn from(t: &WorkflowTemplate) -> Self {
        Self {
            id: t.id,
            code: t.code.clone(),
            name: t.name.clone(),
            name_local: t.name_local.clone(),
            entity_type: t.entity_type.clone(),
            step_count: t.step_count(),
        }
    }
}

/// A pending approval joined with its instance and template for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    #[serde(flatten)]
    pub approval: ApprovalRecord,
    pub instance: WorkflowInstance,
    pub template: Option<TemplateSummary>,
}

/// Full instance view: instance, template and its ledger ordered by step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDetail {
    #[serde(flatten)]
    pub instance: WorkflowInstance,
    pub template: Option<WorkflowTemplate>,
    pub approvals: Vec<ApprovalRecord>,
    /// Users who may act on the pending step; empty once terminal
    #[serde(default)]
    pub current_approvers: Vec<String>,
}
