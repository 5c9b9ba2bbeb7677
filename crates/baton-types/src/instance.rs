//! Workflow instances: one running execution of a definition
//!
//! An instance tracks which step is current, who started the workflow,
//! and the lifecycle status. It is created by the state machine on start
//! and mutated only on accepted submissions (or an out-of-band cancel).

use crate::{StepId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Instance Identifier ──────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex characters, for log lines
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ── Instance Status ──────────────────────────────────────────────────

/// Lifecycle status of a workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created; the entry step is current and nothing has been submitted
    Started,
    /// At least one step completed, more remain
    InProgress,
    /// The chain terminated
    Completed,
    /// Cancelled out-of-band
    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown instance status '{}'", other)),
        }
    }
}

// ── Workflow Instance ────────────────────────────────────────────────

/// A running (or finished) execution of a workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier
    pub id: InstanceId,
    /// The definition this instance was created from
    pub workflow_id: WorkflowId,
    /// Denormalized definition name, kept for resilience if the
    /// definition is edited or removed after the instance starts
    pub workflow_name: String,
    /// The only step eligible for submission; None once terminal
    pub current_step_id: Option<StepId>,
    /// Lifecycle status
    pub status: InstanceStatus,
    /// Email of whoever started the workflow
    pub initiated_by_email: String,
    /// External identity of the initiator (identity-provider id)
    pub initiated_by_external_id: String,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance was last updated
    pub updated_at: DateTime<Utc>,
    /// When the instance reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Create a fresh instance positioned at the entry step
    pub fn start(
        workflow_id: WorkflowId,
        workflow_name: impl Into<String>,
        entry_step: StepId,
        initiated_by_email: impl Into<String>,
        initiated_by_external_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InstanceId::generate(),
            workflow_id,
            workflow_name: workflow_name.into(),
            current_step_id: Some(entry_step),
            status: InstanceStatus::Started,
            initiated_by_email: initiated_by_email.into(),
            initiated_by_external_id: initiated_by_external_id.into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Advance to the next step after an accepted submission
    pub fn advance_to(&mut self, next_step: StepId) {
        self.current_step_id = Some(next_step);
        self.status = InstanceStatus::InProgress;
        self.updated_at = Utc::now();
    }

    /// Terminate the chain after the final step's submission
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.current_step_id = None;
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Cancel out-of-band
    pub fn cancel(&mut self) {
        let now = Utc::now();
        self.current_step_id = None;
        self.status = InstanceStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `step_id` is the step currently awaiting submission
    pub fn is_current(&self, step_id: &StepId) -> bool {
        self.current_step_id.as_ref() == Some(step_id)
    }
}
