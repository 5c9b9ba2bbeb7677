//! Workflow definitions: externally authored, immutable chains of steps
//!
//! A definition is an ordered list of steps linked by `next_step` pointers.
//! Exactly one step should never appear as another step's `next_step`; that
//! step is the entry step. A step without a `next_step` terminates the chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Identifiers ──────────────────────────────────────────────────────

/// Identifier of a workflow definition (catalog-authored, not generated)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a step within a workflow definition
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Catalog Document ─────────────────────────────────────────────────

/// The backing document of the definition provider: a list of workflows
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub workflows: Vec<WorkflowDefinition>,
}

impl CatalogDocument {
    pub fn find(&self, workflow_id: &WorkflowId) -> Option<&WorkflowDefinition> {
        self.workflows.iter().find(|w| &w.id == workflow_id)
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// One workflow: an ordered chain of steps
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Look up a step by id
    pub fn step(&self, step_id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    /// All steps that no other step references via `next_step`, in
    /// definition order. A well-formed chain has exactly one.
    pub fn entry_candidates(&self) -> Vec<&StepDefinition> {
        self.steps
            .iter()
            .filter(|s| !self.steps.iter().any(|o| o.next_step.as_ref() == Some(&s.id)))
            .collect()
    }

    /// The entry step: first definition-order step with no incoming
    /// `next_step` reference. None when every step is referenced
    /// (a cycle) or the definition has no steps.
    pub fn entry_step(&self) -> Option<&StepDefinition> {
        self.entry_candidates().into_iter().next()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

// ── Step Definition ──────────────────────────────────────────────────

/// One step of a workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub name: String,
    /// The step that becomes current once this one completes.
    /// Absent on the final step of the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<StepId>,
    /// Who may act on this step: a literal email or a template reference
    /// such as `{{s1.manager_email}}`. Absent means anyone.
    #[serde(
        rename = "assignedTo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_to: Option<String>,
    /// Form presented to the actor for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<StepForm>,
}

impl StepDefinition {
    /// The assignee rule, with an empty string treated as unassigned
    pub fn assignee(&self) -> Option<&str> {
        self.assigned_to.as_deref().filter(|s| !s.is_empty())
    }

    /// A step without a `next_step` terminates the chain
    pub fn is_terminal(&self) -> bool {
        self.next_step.is_none()
    }
}

// ── Form Schema ──────────────────────────────────────────────────────

/// Field schema shown to the actor of a step. The engine treats this as
/// opaque apart from template-valued field defaults; validation of the
/// submitted payload against the schema belongs to the form layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepForm {
    #[serde(default)]
    pub fields: Vec<FormField>,
}

/// One field of a step form
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Default value; may be a template reference resolved per instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
}

/// Declarative constraints on a form field, passed through to callers
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}
