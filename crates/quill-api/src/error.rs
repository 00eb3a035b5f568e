use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// The closed set of service errors. Every variant has exactly one HTTP
/// status; the boundary matches exhaustively so an unmapped error cannot
/// exist.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("This email is already registered")]
    DuplicateEmail,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired OTP")]
    InvalidOrExpiredOtp,

    #[error("User not found")]
    UserNotFound,

    #[error("Email is already verified")]
    AlreadyVerified,

    #[error("{0}")]
    Validation(String),

    #[error("Blog not found")]
    PostNotFound,

    #[error("Unauthorized to modify this blog")]
    Forbidden,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Token is invalid or expired.")]
    InvalidToken,

    #[error("Could not send verification email. Please try again later.")]
    EmailDispatch,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidOrExpiredOtp
            | ApiError::UserNotFound
            | ApiError::AlreadyVerified
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PostNotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden | ApiError::InvalidToken => StatusCode::FORBIDDEN,
            ApiError::EmailDispatch => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn duplicate_email_is_conflict() {
        assert_eq!(response_status(ApiError::DuplicateEmail), StatusCode::CONFLICT);
    }

    #[test]
    fn credential_failures_are_unauthorized() {
        assert_eq!(
            response_status(ApiError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(response_status(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn otp_and_validation_failures_are_bad_request() {
        assert_eq!(
            response_status(ApiError::InvalidOrExpiredOtp),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(response_status(ApiError::UserNotFound), StatusCode::BAD_REQUEST);
        assert_eq!(response_status(ApiError::AlreadyVerified), StatusCode::BAD_REQUEST);
        assert_eq!(
            response_status(ApiError::Validation("missing title".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn ownership_and_token_failures_are_forbidden() {
        assert_eq!(response_status(ApiError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(response_status(ApiError::InvalidToken), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_post_is_not_found() {
        assert_eq!(response_status(ApiError::PostNotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn dispatch_and_internal_are_server_errors() {
        assert_eq!(
            response_status(ApiError::EmailDispatch),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            response_status(ApiError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
