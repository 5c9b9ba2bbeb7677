//! Store contract for workflow instances and step executions
//!
//! The engine talks to persistence through one trait, [`InstanceStore`].
//! Reads are plain lookups. The interesting write is
//! [`InstanceStore::commit_submission`], which bundles every row a
//! submission touches: it completes the current step, advances (or
//! finishes) the instance, and seeds the next pending row, all under
//! one compare-and-set on the instance's current step.

use async_trait::async_trait;
use baton_types::{
    InstanceId, InstanceStatus, StepData, StepExecution, StepId, WorkflowInstance, WorkflowResult,
};
use chrono::{DateTime, Utc};

// ── Query Types ──────────────────────────────────────────────────────

/// Filters for the instance listing query. All fields are conjunctive;
/// `None` means "do not filter on this".
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub status: Option<InstanceStatus>,
    /// Exact match on the initiator's email
    pub initiated_by: Option<String>,
    /// Instances whose current step is pending and assigned to this email
    pub assigned_to: Option<String>,
    /// Inclusive lower bound on instance creation time
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on instance creation time
    pub created_before: Option<DateTime<Utc>>,
}

/// Pagination window for listing queries
#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// An instance together with its full execution history, ordered by
/// row creation time
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub instance: WorkflowInstance,
    pub executions: Vec<StepExecution>,
}

/// One page of the instance listing. `total_count` is the match count
/// before the window was applied.
#[derive(Debug, Clone)]
pub struct InstancePage {
    pub items: Vec<InstanceRecord>,
    pub total_count: usize,
}

/// A pending step paired with the instance it belongs to
#[derive(Debug, Clone)]
pub struct PendingExecution {
    pub instance: WorkflowInstance,
    pub execution: StepExecution,
}

// ── Submission Commit ────────────────────────────────────────────────

/// Everything a submission changes, applied as one atomic unit.
///
/// `expected_current_step` is the compare-and-set guard: the store
/// rejects the commit with a conflict if the instance has moved on
/// since the engine read it.
#[derive(Debug, Clone)]
pub struct SubmissionCommit {
    pub instance_id: InstanceId,
    pub expected_current_step: StepId,
    /// Display name of the submitted step, for rows created on the fly
    pub step_name: String,
    pub actor_email: String,
    pub step_data: StepData,
    /// `None` finishes the instance
    pub next: Option<NextStepActivation>,
}

/// Advancement applied together with a submission
#[derive(Debug, Clone)]
pub struct NextStepActivation {
    pub step_id: StepId,
    /// Material for the new pending row. `None` advances the pointer
    /// without creating a row: the next step has no assignee rule, or
    /// its id does not resolve to a step in the definition.
    pub pending: Option<PendingStepSeed>,
}

/// Material for the pending row of a newly activated step
#[derive(Debug, Clone)]
pub struct PendingStepSeed {
    pub step_name: String,
    pub assigned_to_email: Option<String>,
}

/// What a committed submission produced: the completed execution row
/// and the instance as the commit left it
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub execution: StepExecution,
    pub instance: WorkflowInstance,
}

// ── Store Contract ───────────────────────────────────────────────────

/// Persistence contract for workflow instances and their step executions
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a freshly started instance. No execution row exists yet;
    /// the entry step gets its row when it is submitted.
    async fn create_instance(&self, instance: WorkflowInstance) -> WorkflowResult<()>;

    /// Get an instance by id
    async fn get_instance(&self, id: &InstanceId) -> WorkflowResult<Option<WorkflowInstance>>;

    /// List instances matching `filter`, newest first, windowed by `window`
    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        window: QueryWindow,
    ) -> WorkflowResult<InstancePage>;

    /// Get the execution row for one step of an instance
    async fn get_execution(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
    ) -> WorkflowResult<Option<StepExecution>>;

    /// All execution rows of an instance, ordered by row creation time
    async fn list_executions(&self, instance_id: &InstanceId) -> WorkflowResult<Vec<StepExecution>>;

    /// Pending rows assigned to `email` (exact match), paired with their
    /// instances
    async fn pending_for_assignee(&self, email: &str) -> WorkflowResult<Vec<PendingExecution>>;

    /// Apply a submission atomically: complete the current step, advance
    /// or finish the instance, seed the next pending row.
    ///
    /// Fails with a conflict when the instance is terminal or its current
    /// step no longer matches `expected_current_step`.
    async fn commit_submission(&self, commit: SubmissionCommit) -> WorkflowResult<SubmissionOutcome>;

    /// Cancel an instance and retire its pending rows as skipped.
    /// Fails with a conflict when the instance is already terminal.
    async fn cancel_instance(&self, id: &InstanceId) -> WorkflowResult<WorkflowInstance>;
}
