//! Workflow instance handlers
//!
//! Covers the full instance lifecycle: start, inspect, list with
//! filters and pagination, per-step access checks, step submission,
//! and cancellation. Request validation happens here; everything
//! after that is delegated to the engine.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use baton_store::InstanceFilter;
use baton_types::{
    ExecutionId, ExecutionStatus, InstanceId, InstanceStatus, StepData, StepDefinition,
    StepExecution, StepId, WorkflowId, WorkflowInstance,
};

use baton_engine::InstanceDetail;

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};

// ── Shared request plumbing ─────────────────────────────────────────

/// Query carrying the acting user's email.
#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_email: Option<String>,
}

/// Treats missing and empty strings the same way.
pub(super) fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_instance_id(raw: &str) -> ApiResult<InstanceId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid instance ID: {}", raw)))
}

// ── Response shapes ─────────────────────────────────────────────────

/// One execution row as rendered inside instance payloads.
#[derive(Debug, Serialize)]
pub struct StepSummary {
    pub step_id: StepId,
    pub step_name: String,
    pub status: ExecutionStatus,
    pub assigned_to_email: Option<String>,
    pub executed_by_email: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&StepExecution> for StepSummary {
    fn from(execution: &StepExecution) -> Self {
        Self {
            step_id: execution.step_id.clone(),
            step_name: execution.step_name.clone(),
            status: execution.status,
            assigned_to_email: execution.assigned_to_email.clone(),
            executed_by_email: execution.executed_by_email.clone(),
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            created_at: execution.created_at,
        }
    }
}

/// Compact instance shape returned by start and cancel.
#[derive(Debug, Serialize)]
pub struct InstanceSummaryResponse {
    pub instance_id: InstanceId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub current_step_id: Option<StepId>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&WorkflowInstance> for InstanceSummaryResponse {
    fn from(instance: &WorkflowInstance) -> Self {
        Self {
            instance_id: instance.id,
            workflow_id: instance.workflow_id.clone(),
            workflow_name: instance.workflow_name.clone(),
            current_step_id: instance.current_step_id.clone(),
            status: instance.status,
            created_at: instance.created_at,
        }
    }
}

/// Full instance payload shared by the detail view and list items.
#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub instance_id: InstanceId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub current_step_id: Option<StepId>,
    pub current_step: Option<StepSummary>,
    pub status: InstanceStatus,
    pub initiated_by_email: String,
    pub initiated_by_external_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepSummary>,
    pub steps_count: usize,
}

impl From<InstanceDetail> for InstanceResponse {
    fn from(detail: InstanceDetail) -> Self {
        let current_step = detail.current_step_row().map(StepSummary::from);
        let steps = detail.executions.iter().map(StepSummary::from).collect();
        Self {
            instance_id: detail.instance.id,
            workflow_id: detail.instance.workflow_id.clone(),
            workflow_name: detail.workflow_name.clone(),
            current_step_id: detail.instance.current_step_id.clone(),
            current_step,
            status: detail.instance.status,
            initiated_by_email: detail.instance.initiated_by_email.clone(),
            initiated_by_external_id: detail.instance.initiated_by_external_id.clone(),
            created_at: detail.instance.created_at,
            updated_at: detail.instance.updated_at,
            completed_at: detail.instance.completed_at,
            steps,
            steps_count: detail.steps_count,
        }
    }
}

// ── Start ───────────────────────────────────────────────────────────

/// Start request
#[derive(Debug, Deserialize)]
pub struct StartInstanceRequest {
    pub workflow_id: Option<String>,
    pub actor_email: Option<String>,
    pub actor_external_id: Option<String>,
}

/// POST /api/v1/workflows/instances/start
pub async fn start_instance(
    State(state): State<AppState>,
    Json(request): Json<StartInstanceRequest>,
) -> ApiResult<(StatusCode, Json<InstanceSummaryResponse>)> {
    let fields = (
        required(&request.workflow_id),
        required(&request.actor_email),
        required(&request.actor_external_id),
    );
    let (workflow_id, actor_email, actor_external_id) = match fields {
        (Some(workflow_id), Some(actor_email), Some(actor_external_id)) => {
            (workflow_id, actor_email, actor_external_id)
        }
        _ => {
            let mut missing = Vec::new();
            if fields.0.is_none() {
                missing.push("workflow_id");
            }
            if fields.1.is_none() {
                missing.push("actor_email");
            }
            if fields.2.is_none() {
                missing.push("actor_external_id");
            }
            return Err(ApiError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
    };

    let instance = state
        .engine
        .start(
            &WorkflowId::new(workflow_id.to_string()),
            actor_email,
            actor_external_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InstanceSummaryResponse::from(&instance)),
    ))
}

// ── Read ────────────────────────────────────────────────────────────

/// GET /api/v1/workflows/instances/:instance_id
pub async fn get_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<InstanceResponse>> {
    let instance_id = parse_instance_id(&instance_id)?;
    let detail = state.engine.instance_detail(&instance_id).await?;
    Ok(Json(InstanceResponse::from(detail)))
}

/// List query parameters
#[derive(Debug, Deserialize)]
pub struct ListInstancesQuery {
    pub status: Option<String>,
    pub initiated_by: Option<String>,
    pub assigned_to: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Pagination block returned alongside list results.
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total_count: usize,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct ListInstancesResponse {
    pub instances: Vec<InstanceResponse>,
    pub pagination: Pagination,
}

/// Unparseable timestamps are ignored rather than rejected, so a
/// malformed filter widens the result set instead of failing the call.
fn parse_filter_date(value: &Option<String>) -> Option<DateTime<Utc>> {
    required(value)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// GET /api/v1/workflows/instances
pub async fn list_instances(
    State(state): State<AppState>,
    Query(query): Query<ListInstancesQuery>,
) -> ApiResult<Json<ListInstancesResponse>> {
    let status = match required(&query.status) {
        Some(raw) => Some(raw.parse::<InstanceStatus>().map_err(ApiError::BadRequest)?),
        None => None,
    };

    let filter = InstanceFilter {
        status,
        initiated_by: required(&query.initiated_by).map(str::to_string),
        assigned_to: required(&query.assigned_to).map(str::to_string),
        created_after: parse_filter_date(&query.created_after),
        created_before: parse_filter_date(&query.created_before),
    };

    let listing = state
        .engine
        .list_instances(&filter, query.limit, query.offset.unwrap_or(0))
        .await?;

    let pagination = Pagination {
        total_count: listing.total_count,
        count: listing.items.len(),
        limit: listing.limit,
        offset: listing.offset,
        has_more: listing.has_more(),
    };
    let instances = listing.items.into_iter().map(InstanceResponse::from).collect();

    Ok(Json(ListInstancesResponse {
        instances,
        pagination,
    }))
}

// ── Step access ─────────────────────────────────────────────────────

/// Thin instance reference embedded in step-scoped responses.
#[derive(Debug, Serialize)]
pub struct InstanceRefResponse {
    pub instance_id: InstanceId,
    pub current_step_id: Option<StepId>,
    pub status: InstanceStatus,
}

impl From<&WorkflowInstance> for InstanceRefResponse {
    fn from(instance: &WorkflowInstance) -> Self {
        Self {
            instance_id: instance.id,
            current_step_id: instance.current_step_id.clone(),
            status: instance.status,
        }
    }
}

/// Step access response: the step definition with form defaults
/// already resolved for the acting user.
#[derive(Debug, Serialize)]
pub struct StepAccessResponse {
    pub step: StepDefinition,
    pub instance: InstanceRefResponse,
}

/// GET /api/v1/workflows/instances/:instance_id/steps/:step_id/access
pub async fn validate_step_access(
    State(state): State<AppState>,
    Path((instance_id, step_id)): Path<(String, String)>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<Json<StepAccessResponse>> {
    let actor_email = required(&query.actor_email)
        .ok_or_else(|| ApiError::BadRequest("actor_email query parameter required".to_string()))?;
    let instance_id = parse_instance_id(&instance_id)?;

    let access = state
        .engine
        .validate_step_access(&instance_id, &StepId::new(step_id), actor_email)
        .await?;

    Ok(Json(StepAccessResponse {
        instance: InstanceRefResponse::from(&access.instance),
        step: access.step,
    }))
}

// ── Submit ──────────────────────────────────────────────────────────

/// Submit request
#[derive(Debug, Deserialize)]
pub struct SubmitStepRequest {
    pub actor_email: Option<String>,
    pub step_data: Option<StepData>,
}

/// Instance state after a submission.
#[derive(Debug, Serialize)]
pub struct InstanceStateResponse {
    pub instance_id: InstanceId,
    pub current_step_id: Option<StepId>,
    pub status: InstanceStatus,
    pub updated_at: DateTime<Utc>,
}

/// Submit response
#[derive(Debug, Serialize)]
pub struct SubmitStepResponse {
    pub execution_id: ExecutionId,
    pub instance: InstanceStateResponse,
}

/// POST /api/v1/workflows/instances/:instance_id/steps/:step_id/submit
pub async fn submit_step(
    State(state): State<AppState>,
    Path((instance_id, step_id)): Path<(String, String)>,
    Json(request): Json<SubmitStepRequest>,
) -> ApiResult<Json<SubmitStepResponse>> {
    let actor_email = required(&request.actor_email)
        .ok_or_else(|| ApiError::BadRequest("actor_email is required".to_string()))?;
    let step_data = request
        .step_data
        .ok_or_else(|| ApiError::BadRequest("step_data is required".to_string()))?;
    let instance_id = parse_instance_id(&instance_id)?;

    let outcome = state
        .engine
        .submit(&instance_id, &StepId::new(step_id), actor_email, step_data)
        .await?;

    Ok(Json(SubmitStepResponse {
        execution_id: outcome.execution.id,
        instance: InstanceStateResponse {
            instance_id: outcome.instance.id,
            current_step_id: outcome.instance.current_step_id.clone(),
            status: outcome.instance.status,
            updated_at: outcome.instance.updated_at,
        },
    }))
}

// ── Cancel ──────────────────────────────────────────────────────────

/// POST /api/v1/workflows/instances/:instance_id/cancel
pub async fn cancel_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<InstanceSummaryResponse>> {
    let instance_id = parse_instance_id(&instance_id)?;
    let instance = state.engine.cancel(&instance_id).await?;
    Ok(Json(InstanceSummaryResponse::from(&instance)))
}
