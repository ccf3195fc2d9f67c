//! Health check and shutdown endpoints

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::{models::HealthResponse, state::AppState};

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.uptime_seconds(),
    })
}

/// Stop every instance, then let the server wind down
pub async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    info!("Shutdown requested");
    state.registry.shutdown_all(None).await;
    state.shutdown.cancel();
    Json(json!({ "status": "shutting_down" }))
}
