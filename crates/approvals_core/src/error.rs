//! Error taxonomy for the approval engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed input: empty step list, missing assignee, blank required field.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Terminal instance, stale step, lost a concurrent decision, template in use.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Backing store failure. Propagated unmodified.
    #[error("persistence: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn template_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("workflow template {id}"))
    }

    pub fn instance_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("workflow instance {id}"))
    }

    /// A decision that lost the optimistic version check.
    pub fn stale(id: impl std::fmt::Display) -> Self {
        Self::InvalidState(format!(
            "workflow instance {id} was modified concurrently; re-fetch and retry"
        ))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::InvalidState(_) => 409,
            Self::Persistence(_) => 500,
        }
    }

    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
