//! API route definitions

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{console, health, instances},
    middleware::logging_middleware,
    state::AppState,
};

/// API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health and shutdown
        .route("/health", get(health::health_check))
        .route("/shutdown", post(health::shutdown))
        // Instances
        .route(
            "/servers",
            get(instances::list_instances).post(instances::create_instance),
        )
        .route("/servers/:id", delete(instances::delete_instance))
        .route("/servers/:id/delete", delete(instances::delete_instance))
        .route("/servers/:id/status", get(instances::instance_status))
        // Lifecycle
        .route("/servers/:id/start", post(instances::start_instance))
        .route("/servers/:id/stop", post(instances::stop_instance))
        .route("/servers/:id/restart", post(instances::restart_instance))
        .route("/servers/:id/kill", post(instances::kill_instance))
        .route("/servers/:id/command", post(instances::send_command))
        // Console
        .route("/servers/:id/console", get(console::console_snapshot))
        .route("/servers/:id/console/stream", get(console::console_stream))
}

/// Routes with state and the logging layers attached
pub fn app(state: AppState) -> Router {
    api_routes()
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
