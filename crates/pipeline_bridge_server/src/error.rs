use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_bridge_core::execution::ExecutionError;
use pipeline_bridge_core::gitlab::GitLabError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Execution not found")]
    NotFound,
    #[error(transparent)]
    GitLab(#[from] GitLabError),
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Execution(ExecutionError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(
                component = "http",
                event = "request_failed",
                error = %self,
            );
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pipeline_bridge_core::contract::ValidationError;

    use super::*;

    #[test]
    fn validation_failures_are_bad_requests() {
        let error = ServerError::from(ExecutionError::from(ValidationError::missing_field(
            "environment",
        )));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServerError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn gitlab_failures_are_server_errors() {
        let error = ServerError::from(ExecutionError::from(GitLabError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        }));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_string(), "GitLab returned HTTP 502: bad gateway");
    }
}
