//! Step executions: per-step records of a workflow instance
//!
//! One row per (instance, step) pair. A row is created `pending` when the
//! engine pre-activates the next step, or directly `completed` when a step
//! is submitted without a prior pending row. Completed rows are immutable
//! history; only pending rows are mutated in place into completed.

use crate::{InstanceId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submitted payload of a step: an opaque key-value map. The engine reads
/// individual keys for template resolution and stores the rest untouched.
pub type StepData = serde_json::Map<String, serde_json::Value>;

// ── Execution Identifier ─────────────────────────────────────────────

/// Store-assigned identifier for a step execution row. Constructors leave
/// it at zero; the store assigns the real id on commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub i64);

impl ExecutionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Execution Status ─────────────────────────────────────────────────

/// Status of a step execution row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Awaiting submission by the assignee
    Pending,
    /// Submission accepted; the row is immutable history
    Completed,
    /// Passed over without a submission
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

// ── Step Execution ───────────────────────────────────────────────────

/// The record of one step's assignment and, once submitted, its data
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepExecution {
    /// Store-assigned row id
    pub id: ExecutionId,
    /// Owning instance; rows never outlive their instance
    pub instance_id: InstanceId,
    pub step_id: StepId,
    /// Denormalized step name from the definition at activation time
    pub step_name: String,
    pub status: ExecutionStatus,
    /// Who is expected to act (resolved assignee rule), if anyone
    pub assigned_to_email: Option<String>,
    /// Who actually submitted the step
    pub executed_by_email: Option<String>,
    /// Captured payload of the submission
    pub step_data: StepData,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepExecution {
    /// A pending row pre-created when a step becomes current
    pub fn pending(
        instance_id: InstanceId,
        step_id: StepId,
        step_name: impl Into<String>,
        assigned_to_email: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId(0),
            instance_id,
            step_id,
            step_name: step_name.into(),
            status: ExecutionStatus::Pending,
            assigned_to_email,
            executed_by_email: None,
            step_data: StepData::new(),
            started_at: Some(now),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A row created directly as completed, for steps submitted without a
    /// prior pending row (the entry step is never pre-created)
    pub fn completed(
        instance_id: InstanceId,
        step_id: StepId,
        step_name: impl Into<String>,
        actor_email: impl Into<String>,
        step_data: StepData,
    ) -> Self {
        let now = Utc::now();
        let actor = actor_email.into();
        Self {
            id: ExecutionId(0),
            instance_id,
            step_id,
            step_name: step_name.into(),
            status: ExecutionStatus::Completed,
            assigned_to_email: Some(actor.clone()),
            executed_by_email: Some(actor),
            step_data,
            started_at: Some(now),
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fill a pending row with the accepted submission
    pub fn complete_with(&mut self, step_data: StepData, executed_by_email: impl Into<String>) {
        let now = Utc::now();
        self.status = ExecutionStatus::Completed;
        self.step_data = step_data;
        self.executed_by_email = Some(executed_by_email.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Retire a pending row without a submission, e.g. when the owning
    /// instance is cancelled
    pub fn skip(&mut self) {
        self.status = ExecutionStatus::Skipped;
        self.updated_at = Utc::now();
    }

    pub fn is_pending(&self) -> bool {
        self.status == ExecutionStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}
