use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{AuthError, FileError, RateLimitError, TokenError};

#[derive(Debug)]
pub enum ApiError {
    ValidationError(String),

    Authentication(String),

    AccountLocked { message: String, retry_after_secs: u64 },

    Token(String),

    Forbidden(String),

    CsrfValidationFailed,

    RateLimitExceeded { message: String, retry_after_secs: u64 },

    NotFound(String),

    DuplicateIdentity(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            ApiError::AccountLocked { message, .. } => write!(f, "Account locked: {}", message),
            ApiError::Token(msg) => write!(f, "Token error: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::CsrfValidationFailed => write!(f, "CSRF validation failed"),
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limited: {}", message)
            }
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::DuplicateIdentity(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Stable machine-readable code carried in every error body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Authentication(_) => "AUTHENTICATION_ERROR",
            ApiError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            ApiError::Token(_) => "TOKEN_ERROR",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::CsrfValidationFailed => "CSRF_VALIDATION_FAILED",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::DuplicateIdentity(_) => "DUPLICATE_IDENTITY",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) | ApiError::Token(_) => StatusCode::UNAUTHORIZED,
            ApiError::AccountLocked { .. } | ApiError::RateLimitExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Forbidden(_) | ApiError::CsrfValidationFailed => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateIdentity(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (error_message, retry_after) = match self {
            ApiError::ValidationError(msg)
            | ApiError::Authentication(msg)
            | ApiError::Token(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::DuplicateIdentity(msg) => (msg, None),
            ApiError::AccountLocked {
                message,
                retry_after_secs,
            }
            | ApiError::RateLimitExceeded {
                message,
                retry_after_secs,
            } => (message, Some(retry_after_secs)),
            ApiError::CsrfValidationFailed => ("CSRF token missing or invalid".to_string(), None),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), None)
            }
        };

        let body = ApiResponse::<()>::error(code, error_message);
        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing => ApiError::InternalError(err.to_string()),
            _ => ApiError::Token(err.to_string()),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::RateLimitExceeded {
            retry_after_secs: err.retry_after_secs(),
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(msg) => ApiError::ValidationError(msg),
            AuthError::InvalidCredentials { .. } => ApiError::Authentication(err.to_string()),
            AuthError::AccountLocked { retry_after } => ApiError::AccountLocked {
                retry_after_secs: u64::try_from(retry_after.num_seconds()).unwrap_or(0).max(1),
                message: err.to_string(),
            },
            AuthError::DuplicateIdentity(_) => ApiError::DuplicateIdentity(err.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::Forbidden(msg) => ApiError::Forbidden(msg),
            AuthError::Token(token_err) => token_err.into(),
            AuthError::Database(msg) | AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound(_) => ApiError::NotFound(err.to_string()),
            FileError::Forbidden(msg) => ApiError::Forbidden(msg),
            FileError::Validation(msg) => ApiError::ValidationError(msg),
            FileError::Database(msg) | FileError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::IdentityField;

    #[test]
    fn test_locked_account_carries_retry_after() {
        let err: ApiError = AuthError::AccountLocked {
            retry_after: chrono::Duration::minutes(10),
        }
        .into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "600");
    }

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                AuthError::Validation("bad".into()).into(),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                AuthError::InvalidCredentials {
                    remaining_attempts: 2,
                }
                .into(),
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_ERROR",
            ),
            (
                TokenError::Expired.into(),
                StatusCode::UNAUTHORIZED,
                "TOKEN_ERROR",
            ),
            (
                AuthError::DuplicateIdentity(IdentityField::Username).into(),
                StatusCode::CONFLICT,
                "DUPLICATE_IDENTITY",
            ),
            (
                FileError::NotFound("f1".into()).into(),
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
            ),
            (
                ApiError::CsrfValidationFailed,
                StatusCode::FORBIDDEN,
                "CSRF_VALIDATION_FAILED",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err: ApiError = FileError::Database("disk I/O error at /var/db".into()).into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
