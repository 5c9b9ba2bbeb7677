//! Error types for batond

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use baton_types::WorkflowError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors (startup and lifecycle)
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Workflow layer error
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Any workflow-layer rejection, mapped to a status by taxonomy
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Workflow(err) => workflow_status(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Status code and stable machine code for each workflow error class
fn workflow_status(err: &WorkflowError) -> (StatusCode, &'static str) {
    match err {
        WorkflowError::DefinitionNotFound(_) => (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND"),
        WorkflowError::InstanceNotFound(_) => (StatusCode::NOT_FOUND, "INSTANCE_NOT_FOUND"),
        WorkflowError::StepNotFound { .. } => (StatusCode::NOT_FOUND, "STEP_NOT_FOUND"),
        WorkflowError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        WorkflowError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED"),
        WorkflowError::StepNotCurrent { .. } => (StatusCode::CONFLICT, "STEP_NOT_CURRENT"),
        WorkflowError::AlreadyTerminal(_) => (StatusCode::CONFLICT, "INSTANCE_TERMINAL"),
        WorkflowError::NoEntryStep(_) => (StatusCode::UNPROCESSABLE_ENTITY, "NO_ENTRY_STEP"),
        WorkflowError::Configuration(_) | WorkflowError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::{InstanceId, StepId, WorkflowId};

    #[test]
    fn test_api_error_status_codes() {
        let err = ApiError::Workflow(WorkflowError::InstanceNotFound(InstanceId::generate()));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = ApiError::Workflow(WorkflowError::Unauthorized {
            step: StepId::new("s2"),
            actor: "mallory@example.com".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);

        let err = ApiError::Workflow(WorkflowError::StepNotCurrent {
            submitted: StepId::new("s1"),
            current: "s2".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err = ApiError::Workflow(WorkflowError::NoEntryStep(WorkflowId::new("wf")));
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError::BadRequest("missing field".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = ApiError::Workflow(WorkflowError::Store("connection refused".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
