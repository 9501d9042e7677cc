//! Workflow lifecycle events and notifier implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ports::Notifier;

/// Logical events emitted after a change commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum WorkflowEvent {
    #[serde(rename = "workflow.started")]
    Started {
        instance_id: Uuid,
        template_id: Uuid,
        entity_type: String,
        entity_id: String,
        requested_by: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "workflow.step_advanced")]
    StepAdvanced {
        instance_id: Uuid,
        from_step: u32,
        to_step: u32,
        step_name: String,
        assigned_to: Option<String>,
        assigned_role: Option<String>,
        approved_by: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "workflow.completed")]
    Completed {
        instance_id: Uuid,
        entity_type: String,
        entity_id: String,
        completed_by: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "workflow.rejected")]
    Rejected {
        instance_id: Uuid,
        entity_type: String,
        entity_id: String,
        step_index: u32,
        rejected_by: String,
        comments: Option<String>,
        at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "workflow.started",
            Self::StepAdvanced { .. } => "workflow.step_advanced",
            Self::Completed { .. } => "workflow.completed",
            Self::Rejected { .. } => "workflow.rejected",
        }
    }

    pub fn instance_id(&self) -> Uuid {
        match self {
            Self::Started { instance_id, .. }
            | Self::StepAdvanced { instance_id, .. }
            | Self::Completed { instance_id, .. }
            | Self::Rejected { instance_id, .. } => *instance_id,
        }
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _event: WorkflowEvent) {}
}

/// Writes each event as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn publish(&self, event: WorkflowEvent) {
        tracing::info!(
            event = event.name(),
            instance_id = %event.instance_id(),
            payload = %serde_json::to_string(&event).unwrap_or_default(),
            "workflow event"
        );
    }
}

/// Fans events out to any number of in-process subscribers.
///
/// Publishing with no subscribers, or with lagging ones, never errors.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, event: WorkflowEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}
