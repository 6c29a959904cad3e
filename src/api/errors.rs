use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::errors::LedgerError;

const RETRY_AFTER_SECONDS: &str = "1";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let retryable = err.is_retryable();
        match err {
            LedgerError::Validation(_) | LedgerError::InvalidAmount { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            LedgerError::InvalidCourse { .. }
            | LedgerError::EnrollmentNotFound { .. }
            | LedgerError::AttemptNotFound { .. }
            | LedgerError::SessionNotFound { .. } => ApiError::NotFound(err.to_string()),
            LedgerError::RetakeLimitReached { .. } | LedgerError::Conflict(_) => {
                ApiError::Conflict(err.to_string())
            }
            LedgerError::Concurrency(_) => {
                tracing::warn!(error = %err, "Concurrent update; client may retry");
                ApiError::ServiceUnavailable(
                    "Concurrent update detected, please retry".to_string(),
                )
            }
            LedgerError::Backend(source) if retryable => {
                tracing::warn!(error = %source, "Database busy; client may retry");
                ApiError::ServiceUnavailable("Database busy, please retry".to_string())
            }
            LedgerError::Backend(source) => ApiError::internal(source, "Database operation failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) | ApiError::Forbidden(message) => message.to_string(),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => message,
        };

        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("X-Admin-Key"));
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn ledger_errors_map_to_http_statuses() {
        let cases = [
            (LedgerError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (LedgerError::InvalidAmount { amount: Decimal::ZERO }, StatusCode::BAD_REQUEST),
            (
                LedgerError::InvalidCourse { course_id: "nope".into() },
                StatusCode::NOT_FOUND,
            ),
            (LedgerError::enrollment_not_found("u1", "c1"), StatusCode::NOT_FOUND),
            (LedgerError::attempt_not_found("a1"), StatusCode::NOT_FOUND),
            (LedgerError::session_not_found("s1"), StatusCode::NOT_FOUND),
            (
                LedgerError::RetakeLimitReached {
                    user_id: "u1".into(),
                    course_id: "c1".into(),
                    scope: "final exam".into(),
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::Conflict("closed".into()), StatusCode::CONFLICT),
            (LedgerError::Concurrency("moved".into()), StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::Backend(sqlx::Error::PoolTimedOut), StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::Backend(sqlx::Error::RowNotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn retryable_errors_ask_client_to_retry() {
        let response = ApiError::from(LedgerError::Concurrency("moved".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|value| value.to_str().ok()),
            Some("1")
        );

        let response =
            ApiError::from(LedgerError::Backend(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let response = ApiError::from(LedgerError::Conflict("closed".into())).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn backend_detail_is_generic() {
        let api = ApiError::from(LedgerError::Backend(sqlx::Error::RowNotFound));
        match api {
            ApiError::Internal(message) => assert_eq!(message, "Database operation failed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
