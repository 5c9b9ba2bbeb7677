//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::rest::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime: String,
}

/// GET /api/v1/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        service: "batond".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}
