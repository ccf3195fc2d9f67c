//! API error types and handling

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hearth_process::SupervisorError;
use serde_json::json;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure reported by the supervisor core
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The runtime is not installed; carries where to get it
    #[error("{source}")]
    RuntimeMissing {
        /// The underlying supervisor error
        source: SupervisorError,
        /// Download page shown to the caller
        download_url: String,
    },

    /// A command request without a command
    #[error("No command provided")]
    MissingCommand,

    /// Malformed query string
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unparseable JSON body
    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Attach the runtime download page to a missing-runtime failure
    pub fn with_download_hint(self, download_url: &str) -> Self {
        match self {
            ApiError::Supervisor(source @ SupervisorError::RuntimeMissing { .. }) => {
                ApiError::RuntimeMissing {
                    source,
                    download_url: download_url.to_string(),
                }
            }
            other => other,
        }
    }

    /// HTTP status and machine-readable code
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Supervisor(e) => (supervisor_status(e), e.code()),
            ApiError::RuntimeMissing { source, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, source.code())
            }
            ApiError::MissingCommand => (StatusCode::BAD_REQUEST, "missing_command"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_json"),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn supervisor_status(error: &SupervisorError) -> StatusCode {
    match error {
        SupervisorError::NotFound { .. } => StatusCode::NOT_FOUND,
        SupervisorError::AlreadyExists { .. } | SupervisorError::AlreadyRunning { .. } => {
            StatusCode::CONFLICT
        }
        SupervisorError::NotRunning
        | SupervisorError::MissingArtifact { .. }
        | SupervisorError::InvalidId(_) => StatusCode::BAD_REQUEST,
        SupervisorError::RuntimeMissing { .. }
        | SupervisorError::SpawnFailure(_)
        | SupervisorError::WriteFailure(_)
        | SupervisorError::DeleteFailed { .. }
        | SupervisorError::StreamError(_)
        | SupervisorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        let mut body = json!({
            "error": code,
            "message": self.to_string(),
        });
        if let ApiError::RuntimeMissing { download_url, .. } = &self {
            body["runtime_download"] = json!(download_url);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
