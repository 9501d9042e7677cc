//! Workflow Template Types
//!
//! A template is an ordered list of approval steps for one class of business
//! entity. Each step is owned by exactly one user or exactly one role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::{human_code, TEMPLATE_CODE_PREFIX};
use crate::error::{Result, WorkflowError};

/// Who is responsible for deciding a step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Assignee {
    User(String),
    Role(String),
}

impl Assignee {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            Self::Role(_) => None,
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Role(role) => Some(role),
        }
    }

    /// Rebuild from the two nullable columns used in storage.
    pub fn from_parts(user_id: Option<String>, role: Option<String>) -> Result<Self> {
        match (non_blank(user_id), non_blank(role)) {
            (Some(user), None) => Ok(Self::User(user)),
            (None, Some(role)) => Ok(Self::Role(role)),
            (None, None) => Err(WorkflowError::validation(
                "step requires an assignee_id or an assignee_role",
            )),
            (Some(_), Some(_)) => Err(WorkflowError::validation(
                "step takes either an assignee_id or an assignee_role, not both",
            )),
        }
    }
}

/// One position in a template's sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StepInput", into = "StepInput")]
pub struct StepDefinition {
    pub name: String,
    pub assignee: Assignee,
}

impl StepDefinition {
    pub fn user(name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assignee: Assignee::User(user_id.into()),
        }
    }

    pub fn role(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assignee: Assignee::Role(role.into()),
        }
    }
}

/// Wire shape of a step: exactly one of `assignee_id` / `assignee_role`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_role: Option<String>,
}

impl TryFrom<StepInput> for StepDefinition {
    type Error = WorkflowError;

    fn try_from(input: StepInput) -> Result<Self> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(WorkflowError::validation("step name must not be blank"));
        }
        let assignee = Assignee::from_parts(input.assignee_id, input.assignee_role)
            .map_err(|e| match e {
                WorkflowError::Validation(msg) => {
                    WorkflowError::Validation(format!("step '{name}': {msg}"))
                }
                other => other,
            })?;
        Ok(Self { name, assignee })
    }
}

impl From<StepDefinition> for StepInput {
    fn from(step: StepDefinition) -> Self {
        let (assignee_id, assignee_role) = match step.assignee {
            Assignee::User(id) => (Some(id), None),
            Assignee::Role(role) => (None, Some(role)),
        };
        Self {
            name: step.name,
            assignee_id,
            assignee_role,
        }
    }
}

/// Validate a full step list. Empty lists are rejected.
pub fn validate_steps(steps: Vec<StepInput>) -> Result<Vec<StepDefinition>> {
    if steps.is_empty() {
        return Err(WorkflowError::validation(
            "a workflow template needs at least one step",
        ));
    }
    steps.into_iter().map(StepDefinition::try_from).collect()
}

/// A reusable approval workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Display name in the secondary UI language
    #[serde(default)]
    pub name_local: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Business entity type this template approves (e.g. "purchase_requisition")
    pub entity_type: String,
    pub steps: Vec<StepDefinition>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn step(&self, index: u32) -> Option<&StepDefinition> {
        self.steps.get(index as usize)
    }

    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn last_step_index(&self) -> Option<u32> {
        self.step_count().checked_sub(1)
    }
}

/// Request to create a template
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub name_local: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub entity_type: String,
    #[serde(default)]
    pub steps: Vec<StepInput>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewTemplate {
    /// Validate and materialize into a template with a fresh id and code.
    pub fn into_template(self, now: DateTime<Utc>) -> Result<WorkflowTemplate> {
        let name = required("name", self.name)?;
        let entity_type = required("entity_type", self.entity_type)?;
        let steps = validate_steps(self.steps)?;
        let id = Uuid::new_v4();

        Ok(WorkflowTemplate {
            id,
            code: human_code(TEMPLATE_CODE_PREFIX, now, id),
            name,
            name_local: non_blank(self.name_local),
            description: non_blank(self.description),
            entity_type,
            steps,
            is_active: true,
            created_by: non_blank(self.created_by),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a template. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_local: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<StepInput>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TemplatePatch {
    pub fn changes_steps(&self) -> bool {
        self.steps.is_some()
    }

    pub fn apply(self, mut template: WorkflowTemplate, now: DateTime<Utc>) -> Result<WorkflowTemplate> {
        if let Some(name) = self.name {
            template.name = required("name", name)?;
        }
        if let Some(name_local) = self.name_local {
            template.name_local = non_blank(Some(name_local));
        }
        if let Some(description) = self.description {
            template.description = non_blank(Some(description));
        }
        if let Some(steps) = self.steps {
            template.steps = validate_steps(steps)?;
        }
        if let Some(active) = self.is_active {
            template.is_active = active;
        }
        template.updated_at = now;
        Ok(template)
    }
}

/// Filter for listing templates
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplateFilter {
    /// Case-insensitive substring of `name` or `name_local`
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl TemplateFilter {
    pub fn matches(&self, template: &WorkflowTemplate) -> bool {
        if let Some(entity_type) = &self.entity_type {
            if &template.entity_type != entity_type {
                return false;
            }
        }
        if let Some(active) = self.active {
            if template.is_active != active {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let in_name = template.name.to_lowercase().contains(&needle);
            let in_local = template
                .name_local
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle));
            if !in_name && !in_local {
                return false;
            }
        }
        true
    }
}

pub(crate) fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
