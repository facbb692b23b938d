use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use circle_types::api::MessageResponse;
use circle_types::connection::TransitionError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed input, self-reference, status mismatch, unknown target
    #[error("{0}")]
    Validation(String),

    /// The operation is not legal from the current state
    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized.")]
    Unauthorized,

    #[error("Forbidden.")]
    Forbidden,

    #[error("Not found.")]
    NotFound,

    #[error("Payload too large.")]
    PayloadTooLarge,

    #[error("Internal server error.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid_request() -> Self {
        Self::Validation("Invalid request.".into())
    }

    pub fn user_not_found() -> Self {
        Self::Validation("User not found.".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotFound => Self::Validation(err.to_string()),
            _ => Self::Conflict(err.to_string()),
        }
    }
}

// Extractor rejections are client errors like any other and answer with the
// same `{message}` body instead of axum's plain-text one.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected JSON body: {}", rejection.body_text());
        Self::invalid_request()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        debug!("Rejected query string: {}", rejection.body_text());
        Self::invalid_request()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(cause) = &self {
            error!("Internal error: {:#}", cause);
        }

        let status = self.status();
        let body = MessageResponse {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use circle_types::models::ConnectionStatus;

    #[test]
    fn conflicts_and_validation_are_client_errors() {
        let conflict: ApiError = TransitionError::AlreadyInState(ConnectionStatus::Requested).into();
        assert!(matches!(conflict, ApiError::Conflict(_)));
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);

        let missing: ApiError = TransitionError::NotFound.into();
        assert!(matches!(missing, ApiError::Validation(_)));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = ApiError::Internal(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error.");
    }
}
