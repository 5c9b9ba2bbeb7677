//! Workflow definition handlers
//!
//! Read-only views over the definition catalog, plus an explicit
//! reload binding for operators who edited the catalog file in place.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use baton_types::{WorkflowDefinition, WorkflowId};

use crate::api::rest::state::AppState;
use crate::error::ApiResult;

/// GET /api/v1/workflows
///
/// Lists every workflow definition in the catalog.
pub async fn list_definitions(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.engine.definitions()?))
}

/// GET /api/v1/workflows/:workflow_id
pub async fn get_definition(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let definition = state.engine.definition(&WorkflowId::new(workflow_id))?;
    Ok(Json(definition))
}

/// Reload response
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    /// Number of workflow definitions after the reload
    pub workflows: usize,
}

/// POST /api/v1/workflows/reload
///
/// Re-reads the catalog file and swaps the in-memory snapshot.
/// Running instances are unaffected until their next operation.
pub async fn reload_definitions(
    State(state): State<AppState>,
) -> ApiResult<Json<ReloadResponse>> {
    let workflows = state.engine.reload_definitions()?;
    Ok(Json(ReloadResponse { workflows }))
}
