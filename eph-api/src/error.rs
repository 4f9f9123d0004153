use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eph_core::WorkspaceError;
use serde_json::json;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::NotFound(_) | WorkspaceError::BackendUnmatched(_) => {
                ApiError::NotFound(err.to_string())
            }
            WorkspaceError::InvalidName(_)
            | WorkspaceError::InvalidSpec(_)
            | WorkspaceError::Config(_) => ApiError::BadRequest(err.to_string()),
            WorkspaceError::UpdateInProgress(_) => ApiError::Conflict(err.to_string()),
            _ => {
                error!(error = %err, "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: WorkspaceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_workspace_errors_map_to_status_codes() {
        assert_eq!(status(WorkspaceError::NotFound("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(WorkspaceError::BackendUnmatched("azure".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(WorkspaceError::InvalidName("A".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(WorkspaceError::Config("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(WorkspaceError::UpdateInProgress("a".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(WorkspaceError::Upstream("engine".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(WorkspaceError::MissingExpiry("a".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
