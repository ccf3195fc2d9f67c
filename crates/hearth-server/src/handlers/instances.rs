//! Instance lifecycle handlers

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

use super::optional_json;
use crate::{
    error::{ApiError, ApiResult},
    models::{
        ActionResponse, CommandRequest, CommandResponse, CreateQuery, ListResponse,
        StartRequest, StopRequest,
    },
    state::AppState,
};
use hearth_process::InstanceStatus;

/// List every instance, including directories never loaded
pub async fn list_instances(State(state): State<AppState>) -> ApiResult<Json<ListResponse>> {
    let servers = state.registry.list().await?;
    Ok(Json(ListResponse { servers }))
}

/// Create an instance directory and register it
pub async fn create_instance(
    State(state): State<AppState>,
    query: Result<Query<CreateQuery>, QueryRejection>,
) -> ApiResult<(StatusCode, Json<ActionResponse>)> {
    let Query(query) = query?;
    let instance = state.registry.create(query.server_id.as_deref()).await?;
    let response = ActionResponse::new("created", instance.id().as_str()).path(instance.dir());
    Ok((StatusCode::CREATED, Json(response)))
}

/// Launch the instance's process
pub async fn start_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ActionResponse>> {
    let request: StartRequest = optional_json(&body)?;
    let args = request.args.unwrap_or_default();
    let pid = state
        .registry
        .start(&id, request.memory.as_deref(), &args)
        .await
        .map_err(|e| ApiError::from(e).with_download_hint(state.runtime_download_url()))?;
    Ok(Json(ActionResponse::new("started", id).pid(pid)))
}

/// Stop gracefully, killing after the timeout
pub async fn stop_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ActionResponse>> {
    let request: StopRequest = optional_json(&body)?;
    let timeout = request.timeout_secs.map(Duration::from_secs);
    state.registry.stop(&id, timeout).await?;
    Ok(Json(ActionResponse::new("stopped", id)))
}

/// Stop, settle, start
pub async fn restart_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ActionResponse>> {
    let request: StartRequest = optional_json(&body)?;
    let args = request.args.unwrap_or_default();
    let pid = state
        .registry
        .restart(&id, request.memory.as_deref(), &args)
        .await
        .map_err(|e| ApiError::from(e).with_download_hint(state.runtime_download_url()))?;
    Ok(Json(ActionResponse::new("restarted", id).pid(pid)))
}

/// Terminate immediately
pub async fn kill_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    state.registry.kill(&id).await?;
    Ok(Json(ActionResponse::new("killed", id)))
}

/// Stop and remove the instance and its directory
pub async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    state.registry.delete(&id).await?;
    Ok(Json(ActionResponse::new("deleted", id)))
}

/// Lifecycle status
pub async fn instance_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InstanceStatus>> {
    Ok(Json(state.registry.status(&id).await?))
}

/// Write one line to the process's stdin
pub async fn send_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CommandResponse>> {
    let request: CommandRequest = optional_json(&body)?;
    let command = request
        .command
        .filter(|command| !command.trim().is_empty())
        .ok_or(ApiError::MissingCommand)?;

    state.registry.send_command(&id, &command).await?;
    Ok(Json(CommandResponse {
        status: "sent".to_string(),
        command,
    }))
}
