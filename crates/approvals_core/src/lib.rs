//! Multi-step approval workflows.
//!
//! Templates define an ordered list of approval steps, each owned by a single
//! user or role. Instances walk those steps one at a time; every step decision
//! lands in an append-only approval ledger. Storage, role lookup and event
//! delivery sit behind the traits in [`ports`].

pub mod approval;
pub mod code;
pub mod engine;
pub mod error;
pub mod events;
pub mod instance;
pub mod ports;
pub mod roles;
pub mod store_memory;
pub mod template;
pub mod transition;

pub use approval::{
    ApprovalRecord, ApprovalStatus, DecisionRequest, InstanceDetail, PendingApproval,
    PendingQuery, TemplateSummary, Verdict,
};
pub use engine::{ApprovalEngine, Decision};
pub use error::{Result, WorkflowError};
pub use events::{BroadcastNotifier, NoopNotifier, TracingNotifier, WorkflowEvent};
pub use instance::{
    Created, InstanceFilter, InstanceStats, InstanceStatus, Page, Priority, StartRequest,
    WorkflowInstance,
};
pub use ports::{InstanceStore, Notifier, RoleDirectory, TemplateStore};
pub use roles::StaticRoleDirectory;
pub use store_memory::MemoryStore;
pub use template::{
    Assignee, NewTemplate, StepDefinition, StepInput, TemplateFilter, TemplatePatch,
    WorkflowTemplate,
};
pub use transition::{plan_decision, plan_start, DecisionPlan, Outcome};
