//! Pending work queue handler

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use baton_types::{InstanceId, InstanceStatus, StepId, WorkflowId};

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};

use super::instances::{required, ActorQuery};

/// One step awaiting action by the queried user.
#[derive(Debug, Serialize)]
pub struct PendingStepResponse {
    pub instance_id: InstanceId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub current_step_id: StepId,
    pub step_name: String,
    pub initiated_by_email: String,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub step_created_at: DateTime<Utc>,
}

/// GET /api/v1/workflows/pending
///
/// Returns every pending step assigned to the given user, oldest
/// activation first.
pub async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<Json<Vec<PendingStepResponse>>> {
    let actor_email = required(&query.actor_email)
        .ok_or_else(|| ApiError::BadRequest("actor_email query parameter required".to_string()))?;

    let pending = state.engine.pending_for_user(actor_email).await?;
    let items = pending
        .into_iter()
        .map(|entry| PendingStepResponse {
            instance_id: entry.instance.id,
            workflow_id: entry.instance.workflow_id.clone(),
            workflow_name: entry.workflow_name,
            current_step_id: entry.execution.step_id.clone(),
            step_name: entry.execution.step_name.clone(),
            initiated_by_email: entry.instance.initiated_by_email.clone(),
            status: entry.instance.status,
            created_at: entry.instance.created_at,
            step_created_at: entry.execution.created_at,
        })
        .collect();

    Ok(Json(items))
}
