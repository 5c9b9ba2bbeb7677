//! Error types for the Baton workflow layer

use crate::{InstanceId, StepId, WorkflowId};

/// Errors that can occur in workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Catalog missing or corrupt. Fatal to any operation needing
    /// definitions; fixed by an operator, not by retrying.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(WorkflowId),

    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("Step not found: {step} in workflow {workflow}")]
    StepNotFound { workflow: WorkflowId, step: StepId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Actor {actor} is not authorized for step {step}")]
    Unauthorized { step: StepId, actor: String },

    /// Submission targeted a step that is not the instance's current
    /// step. Rejects "already advanced past" and "not yet reached"
    /// identically; the caller should re-fetch instance state.
    #[error("Step {submitted} is not the current step (current: {current})")]
    StepNotCurrent { submitted: StepId, current: String },

    #[error("Workflow instance already terminal: {0}")]
    AlreadyTerminal(InstanceId),

    /// Malformed chain: every step is referenced as a next step (or the
    /// definition is empty), so no entry step exists.
    #[error("Workflow {0} has no entry step")]
    NoEntryStep(WorkflowId),

    #[error("Store error: {0}")]
    Store(String),
}

impl WorkflowError {
    /// Conflict-class errors: the caller raced another writer or targeted
    /// a stale view and should re-read before retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::StepNotCurrent { .. } | Self::AlreadyTerminal(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DefinitionNotFound(_) | Self::InstanceNotFound(_) | Self::StepNotFound { .. }
        )
    }
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WorkflowError::DefinitionNotFound(WorkflowId::new("onboard"));
        assert_eq!(err.to_string(), "Workflow definition not found: onboard");

        let err = WorkflowError::StepNotCurrent {
            submitted: StepId::new("s1"),
            current: "s2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Step s1 is not the current step (current: s2)"
        );
    }

    #[test]
    fn test_error_classes() {
        assert!(WorkflowError::StepNotCurrent {
            submitted: StepId::new("s1"),
            current: "none".to_string(),
        }
        .is_conflict());
        assert!(WorkflowError::InstanceNotFound(InstanceId::generate()).is_not_found());
        assert!(!WorkflowError::Configuration("bad catalog".to_string()).is_not_found());
    }
}
