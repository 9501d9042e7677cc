//! Workflow Instance Types
//!
//! One approval process for one business entity, tracked against a template.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};

/// Overall status of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Approved,
    Rejected,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// The only legal moves are `pending -> approved` and `pending -> rejected`.
    pub fn transition(self, to: InstanceStatus) -> Result<InstanceStatus> {
        match (self, to) {
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected) => Ok(to),
            (from, to) => Err(WorkflowError::InvalidState(format!(
                "cannot move a workflow instance from {from} to {to}"
            ))),
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown instance status: {}", s)),
        }
    }
}

/// Request priority, informational only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// A running (or finished) approval process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub code: String,
    pub template_id: Uuid,

    /// Type of the business object under approval (e.g. "invoice_void")
    pub entity_type: String,
    /// Identifier of the business object under approval
    pub entity_id: String,

    /// 0-based index into the template's steps
    pub current_step: u32,
    pub status: InstanceStatus,
    pub priority: Priority,

    pub requested_by: String,
    pub requested_at: DateTime<Utc>,

    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub notes: Option<String>,

    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped on every committed decision
    pub version: i64,
}

impl WorkflowInstance {
    /// Fail with `InvalidState` unless the instance still awaits a decision.
    pub fn ensure_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(WorkflowError::InvalidState(format!(
                "workflow instance {} is already {}",
                self.code, self.status
            )));
        }
        Ok(())
    }
}

/// Request to start a workflow against a business entity
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StartRequest {
    pub template_id: Uuid,
    /// Defaults to the template's entity type
    #[serde(default)]
    pub entity_type: Option<String>,
    pub entity_id: String,
    pub requested_by: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Identity of a freshly created record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: Uuid,
    pub code: String,
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Filter for listing instances
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InstanceFilter {
    #[serde(default)]
    pub status: Option<InstanceStatus>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl InstanceFilter {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Predicate part of the filter (paging ignored)
    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        self.status.map_or(true, |s| instance.status == s)
            && self
                .entity_type
                .as_ref()
                .map_or(true, |t| &instance.entity_type == t)
            && self
                .requested_by
                .as_ref()
                .map_or(true, |r| &instance.requested_by == r)
            && self.template_id.map_or(true, |t| instance.template_id == t)
    }
}

/// One page of results plus the unpaged match count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Instance counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl InstanceStats {
    pub fn record(&mut self, status: InstanceStatus) {
        self.total += 1;
        match status {
            InstanceStatus::Pending => self.pending += 1,
            InstanceStatus::Approved => self.approved += 1,
            InstanceStatus::Rejected => self.rejected += 1,
        }
    }
}
