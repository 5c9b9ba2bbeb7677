//! Read models assembled by the engine
//!
//! These join store rows with definition-derived display metadata so
//! transports can render responses without consulting the catalog
//! themselves.

use baton_types::{StepDefinition, StepExecution, WorkflowInstance};

/// An instance joined with its execution history and display metadata.
///
/// `workflow_name` and `steps_count` come from the live definition when
/// the catalog still carries it, and fall back to what the instance
/// recorded at start time otherwise.
#[derive(Clone, Debug)]
pub struct InstanceDetail {
    pub instance: WorkflowInstance,
    pub executions: Vec<StepExecution>,
    pub workflow_name: String,
    pub steps_count: usize,
}

impl InstanceDetail {
    /// The execution row of the instance's current step, if one exists.
    /// Terminal instances have no current step; a freshly started
    /// instance has no row for it yet.
    pub fn current_step_row(&self) -> Option<&StepExecution> {
        let current = self.instance.current_step_id.as_ref()?;
        self.executions.iter().find(|row| &row.step_id == current)
    }
}

/// One page of the instance listing
#[derive(Clone, Debug)]
pub struct InstanceListing {
    pub items: Vec<InstanceDetail>,
    /// Matches before pagination was applied
    pub total_count: usize,
    pub limit: usize,
    pub offset: usize,
}

impl InstanceListing {
    pub fn has_more(&self) -> bool {
        self.offset + self.limit < self.total_count
    }
}

/// A step waiting on a user, joined with the instance it belongs to
#[derive(Clone, Debug)]
pub struct PendingStep {
    pub instance: WorkflowInstance,
    pub execution: StepExecution,
    pub workflow_name: String,
}

/// Result of a successful access check: the step definition with its
/// form defaults resolved against this instance
#[derive(Clone, Debug)]
pub struct StepAccess {
    pub step: StepDefinition,
    pub instance: WorkflowInstance,
}
