//! Handler error type and its mapping onto JSON error responses.
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Every error a handler may return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or out-of-range client input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("File size too large. Maximum size is {0}MB.")]
    PayloadTooLarge(usize),

    /// The store, object storage or OCR engine failed.
    ///
    /// The inner error is only logged; clients get a generic message.
    #[error("dependency failure: {0:#}")]
    Dependency(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Dependency(_) => "Internal server error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Dependency(e) = &self {
            error!(error = %format!("{e:#}"), "dependency failure");
        }
        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::validation("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::PayloadTooLarge(10).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn dependency_details_are_not_leaked() {
        let err = ApiError::from(anyhow::anyhow!("password=hunter2 connection refused"));
        assert_eq!(err.public_message(), "Internal server error occurred");
        assert_eq!(
            ApiError::validation("page must be a positive integer").public_message(),
            "page must be a positive integer"
        );
        assert_eq!(
            ApiError::PayloadTooLarge(10).public_message(),
            "File size too large. Maximum size is 10MB."
        );
    }
}
