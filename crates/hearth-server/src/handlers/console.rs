//! Console snapshot and live stream handlers

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use tracing::debug;

use crate::{
    error::ApiResult,
    models::{ConsoleQuery, ConsoleResponse},
    state::AppState,
};

/// The last `last_n` console lines
pub async fn console_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ConsoleQuery>, QueryRejection>,
) -> ApiResult<Json<ConsoleResponse>> {
    let Query(query) = query?;
    let lines = state.registry.console_snapshot(&id, query.last_n).await?;
    Ok(Json(ConsoleResponse {
        server_id: id,
        lines,
    }))
}

/// Replay the console, then follow it until the process is gone
///
/// Each line is one `data:` frame; the stream closes after the end sentinel.
/// A client that disconnects drops the body, which detaches the session.
pub async fn console_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let stream = state.registry.console_stream(&id).await?;
    debug!(instance = %id, "Console stream opened");

    let frames = stream.map(|event| Ok::<_, Infallible>(event.to_frame()));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}
