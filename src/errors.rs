use crate::{
    models::upload::{FailureKind, UploadFailure},
    services::error::{ImageStoreError, TierError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Map a terminal orchestration failure onto a status code.
    pub fn from_failure(failure: &UploadFailure) -> Self {
        let status = match failure.kind {
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::MalformedKey => StatusCode::BAD_REQUEST,
            FailureKind::IntegrityMismatch | FailureKind::StoreFault | FailureKind::Codec => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, failure.message.clone())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<TierError> for AppError {
    fn from(err: TierError) -> Self {
        let status = match &err {
            TierError::InvalidBucketName { .. }
            | TierError::InvalidObjectKey(_)
            | TierError::InvalidVaultName(_) => StatusCode::BAD_REQUEST,
            TierError::ArchiveNotFound(_) | TierError::JobNotFound(_) => StatusCode::NOT_FOUND,
            TierError::JobNotReady(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<ImageStoreError> for AppError {
    fn from(err: ImageStoreError) -> Self {
        match err {
            ImageStoreError::StoreFault(tier) => tier.into(),
            other => AppError::from_failure(&other.into_failure()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::from(TierError::JobNotReady("j".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(TierError::InvalidObjectKey("..".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(TierError::Transport("down".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_failure_is_404() {
        let err = AppError::from(ImageStoreError::NotFound("a/b".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
