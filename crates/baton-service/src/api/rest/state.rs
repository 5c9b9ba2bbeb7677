//! Shared state for REST API handlers

use baton_engine::WorkflowEngine;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The workflow engine backing every operation
    pub engine: Arc<WorkflowEngine>,

    /// Daemon version reported by the health endpoint
    pub version: String,

    /// When this daemon process started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// Human-readable uptime for diagnostics.
    pub fn uptime(&self) -> String {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        let seconds = elapsed.num_seconds();

        if seconds < 60 {
            format!("{}s", seconds)
        } else if seconds < 3600 {
            format!("{}m {}s", seconds / 60, seconds % 60)
        } else if seconds < 86400 {
            format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
        } else {
            format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
        }
    }
}
