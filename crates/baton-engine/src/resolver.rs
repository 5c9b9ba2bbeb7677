//! Template resolution for assignee rules and pre-filled form values
//!
//! Definitions may reference data produced earlier in the chain with
//! `{{stepId.fieldName}}`. Resolution reads the referenced step's
//! completed submission out of the store; two field names are virtual
//! and resolve against the instance itself instead. Anything that does
//! not resolve is passed through unchanged, so a half-written template
//! degrades to a literal rather than an error.

use baton_store::InstanceStore;
use baton_types::{StepData, StepId, WorkflowInstance, WorkflowResult};
use serde_json::Value;
use std::sync::Arc;

/// Virtual field resolving to the initiator's email address
pub const INITIATOR_EMAIL_FIELD: &str = "user_email";
/// Virtual field resolving to the initiator's display name
pub const INITIATOR_NAME_FIELD: &str = "user_display_name";

/// Split `{{stepId.fieldName}}` into its two segments.
///
/// Returns `None` for anything that is not a well-formed two-segment
/// template, including extra dots. Segments are not trimmed, so inner
/// whitespace makes the reference unresolvable rather than lenient.
fn template_path(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?.trim();
    let mut parts = inner.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(step), Some(field), None) => Some((step, field)),
        _ => None,
    }
}

/// Resolves template references against an instance's completed steps.
///
/// An optional overlay supplies the submission currently being
/// processed, so a step's own data can feed the next step's assignee
/// before the commit lands.
#[derive(Clone)]
pub struct TemplateResolver {
    store: Arc<dyn InstanceStore>,
}

impl TemplateResolver {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    /// Resolve a form-field value. Non-string values pass through
    /// untouched.
    pub async fn resolve(
        &self,
        value: &Value,
        instance: &WorkflowInstance,
    ) -> WorkflowResult<Value> {
        match value {
            Value::String(text) => self.resolve_text(text, instance, None).await,
            other => Ok(other.clone()),
        }
    }

    /// Resolve an assignee rule to the email it names. A reference that
    /// resolves to something other than a string falls back to the raw
    /// rule text, which then simply never matches an actor.
    pub async fn resolve_assignee(
        &self,
        rule: &str,
        instance: &WorkflowInstance,
        overlay: Option<(&StepId, &StepData)>,
    ) -> WorkflowResult<String> {
        match self.resolve_text(rule, instance, overlay).await? {
            Value::String(text) => Ok(text),
            _ => Ok(rule.to_string()),
        }
    }

    /// Resolve one template string against the instance.
    ///
    /// Precedence: virtual initiator fields, then the overlay when the
    /// referenced step is the one being submitted, then the store. An
    /// overlay hit never falls through to the store, so a field missing
    /// from the submission resolves to the literal text even if an
    /// older row for the same step had it.
    async fn resolve_text(
        &self,
        text: &str,
        instance: &WorkflowInstance,
        overlay: Option<(&StepId, &StepData)>,
    ) -> WorkflowResult<Value> {
        let Some((step, field)) = template_path(text) else {
            return Ok(Value::String(text.to_string()));
        };

        if field == INITIATOR_EMAIL_FIELD {
            return Ok(Value::String(instance.initiated_by_email.clone()));
        }
        if field == INITIATOR_NAME_FIELD {
            let email = &instance.initiated_by_email;
            let local = email.split('@').next().unwrap_or(email);
            return Ok(Value::String(local.to_string()));
        }

        if let Some((submitted_step, submitted_data)) = overlay {
            if submitted_step.as_str() == step {
                return Ok(submitted_data
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| Value::String(text.to_string())));
            }
        }

        let step_id = StepId::new(step);
        match self.store.get_execution(&instance.id, &step_id).await? {
            Some(row) if row.is_completed() => Ok(row
                .step_data
                .get(field)
                .cloned()
                .unwrap_or_else(|| Value::String(text.to_string()))),
            _ => Ok(Value::String(text.to_string())),
        }
    }
}
