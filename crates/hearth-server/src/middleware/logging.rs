//! Request logging middleware

use std::time::{Duration, Instant};

use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Requests slower than this are logged as warnings
const SLOW_REQUEST: Duration = Duration::from_millis(100);

/// Request logging middleware
///
/// Console streams stay open for the lifetime of a process, so they are
/// exempt from the slow-request warning.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let streaming = uri.path().ends_with("/console/stream");

    tracing::debug!(method = %method, uri = %uri, "Request");

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();

    if duration > SLOW_REQUEST && !streaming {
        tracing::warn!(method = %method, uri = %uri, duration = ?duration, "Slow request");
    }

    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Response"
    );

    response
}
