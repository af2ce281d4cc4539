// Handler error type and its JSON envelope rendering.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::db::StoreError;
use crate::monsters::image_sync::SyncError;
use crate::openrag::FilterError;

/// Errors a handler can return. Each renders as
/// `{"success": false, "error": <message>}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or incomplete input.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A hosted collaborator (vision flow, filter service) failed.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Upstream(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(e) => AppError::Store(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<FilterError> for AppError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::FeatureUnavailable => AppError::NotFound(err.to_string()),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Store(StoreError::Unavailable("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_filter_errors() {
        assert_eq!(
            AppError::from(FilterError::FeatureUnavailable).status(),
            StatusCode::NOT_FOUND
        );
        let err = AppError::from(FilterError::Api {
            status: 502,
            body: "bad gateway".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "OpenRAG API error (502): bad gateway");
    }

    #[test]
    fn test_store_message_passes_through() {
        let err = AppError::from(StoreError::Unavailable("disk full".into()));
        assert_eq!(err.to_string(), "Persistence unavailable: disk full");
    }
}
