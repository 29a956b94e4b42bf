use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::domain::DomainError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request validation failed")]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InvalidTimeRange(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::InvalidTimeRange(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InvalidTimeRange(_) => "INVALID_TIME_RANGE",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::ValidationError(details) => ApiError::Validation(details),
            DomainError::InvalidTimeRange(msg) => ApiError::InvalidTimeRange(msg),
            e @ (DomainError::InvalidQuery(_)
            | DomainError::InvalidWindow(_)
            | DomainError::InvalidMetricValue { .. }) => ApiError::BadRequest(e.to_string()),
            DomainError::DatastoreUnavailable(msg) => ApiError::Unavailable(msg),
            e @ (DomainError::EmptyBucket | DomainError::RepositoryError(_)) => {
                tracing::error!(error = %e, "request failed");
                // driver errors are not echoed back to callers
                ApiError::Internal("internal error".to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(vec![rejection.body_text()])
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let code = self.code();
        let details = match self {
            ApiError::Validation(details) => details,
            _ => Vec::new(),
        };

        tracing::warn!(
            error_code = code,
            error_message = %message,
            status = %status,
            "API error"
        );

        (
            status,
            Json(ErrorResponse {
                error: code,
                message,
                details,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_mapping() {
        let cases = [
            (
                DomainError::ValidationError(vec!["events: empty".to_string()]),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                DomainError::InvalidTimeRange("inverted".to_string()),
                StatusCode::BAD_REQUEST,
                "INVALID_TIME_RANGE",
            ),
            (
                DomainError::InvalidWindow("5m".to_string()),
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
            ),
            (
                DomainError::DatastoreUnavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
            (
                DomainError::RepositoryError(anyhow::anyhow!("password=hunter2")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (domain, status, code) in cases {
            let api: ApiError = domain.into();
            assert_eq!(api.status_code(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn test_repository_error_message_is_hidden() {
        let api: ApiError = DomainError::RepositoryError(anyhow::anyhow!("password=hunter2")).into();
        assert!(!api.to_string().contains("hunter2"));
    }
}
