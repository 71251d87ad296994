use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;

/// Failure taxonomy for every endpoint. Each variant maps to one HTTP status;
/// `Database` and `Internal` are logged server-side and rendered as an opaque
/// 500 so driver details never reach clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Admin access required")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Subscription is invalid or has no sessions remaining")]
    InvalidSubscription,

    #[error("Appointment has already been cancelled")]
    AlreadyCancelled,

    #[error("Appointment has already taken place")]
    AlreadyOccurred,

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::InvalidSubscription
            | ApiError::AlreadyCancelled
            | ApiError::AlreadyOccurred => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_statuses() {
        assert_eq!(
            ApiError::InvalidInput("bad date".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Service not found").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("Time slot is no longer available").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::InvalidSubscription.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::AlreadyCancelled.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::AlreadyOccurred.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_auth_statuses() {
        assert_eq!(
            ApiError::Unauthorized("Missing Authorization header").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = ApiError::Internal("stored start_time failed to parse".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The detailed message exists for the log line only.
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn test_database_error_maps_to_500() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
