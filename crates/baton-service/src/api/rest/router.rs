//! REST API router

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Builds the full API router. All routes live under `/api/v1`.
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Definition catalog
        .route("/workflows", get(handlers::list_definitions))
        .route("/workflows/reload", post(handlers::reload_definitions))
        .route("/workflows/pending", get(handlers::list_pending))
        .route("/workflows/:workflow_id", get(handlers::get_definition))
        // Instances
        .route("/workflows/instances", get(handlers::list_instances))
        .route("/workflows/instances/start", post(handlers::start_instance))
        .route("/workflows/instances/:instance_id", get(handlers::get_instance))
        .route(
            "/workflows/instances/:instance_id/cancel",
            post(handlers::cancel_instance),
        )
        .route(
            "/workflows/instances/:instance_id/steps/:step_id/access",
            get(handlers::validate_step_access),
        )
        .route(
            "/workflows/instances/:instance_id/steps/:step_id/submit",
            post(handlers::submit_step),
        );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
