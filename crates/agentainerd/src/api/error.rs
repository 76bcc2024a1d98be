//! Error — API-level error kinds and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::agent::LifecycleError;
use crate::request::RequestStoreError;
use crate::store::StoreError;

use super::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    /// Wrong state for the requested transition.
    #[error("{0}")]
    Conflict(String),

    #[error("Request persistence is disabled")]
    PersistenceDisabled,

    #[error("{0}")]
    Upstream(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PersistenceDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) | ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Backend details are logged server-side, not exposed.
            ApiError::Store(detail) => {
                tracing::error!("Store error: {}", detail);
                "A store error occurred".to_string()
            }
            ApiError::Engine(detail) => {
                tracing::error!("Engine error: {}", detail);
                "A container engine error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::<()>::error(&message))).into_response()
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(id) => ApiError::NotFound(format!("Agent not found: {}", id)),
            LifecycleError::AlreadyRunning(_)
            | LifecycleError::AlreadyStopped(_)
            | LifecycleError::NotRunning(_) => ApiError::Conflict(err.to_string()),
            LifecycleError::ImageNotFound(image) => {
                ApiError::Validation(format!("Image not found: {}", image))
            }
            LifecycleError::Validation(msg) => ApiError::Validation(msg),
            LifecycleError::Docker(e) => ApiError::Engine(e.to_string()),
            LifecycleError::Store(e) => ApiError::Store(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err.to_string())
    }
}

impl From<RequestStoreError> for ApiError {
    fn from(err: RequestStoreError) -> Self {
        match err {
            RequestStoreError::NotFound(id) => {
                ApiError::NotFound(format!("Request not found: {}", id))
            }
            RequestStoreError::Store(e) => ApiError::Store(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::PersistenceDisabled.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Upstream("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Store("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn lifecycle_conflicts_map_to_conflict() {
        let err: ApiError = LifecycleError::AlreadyRunning("a".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err: ApiError = LifecycleError::NotRunning("a".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn image_not_found_is_a_validation_failure() {
        let err: ApiError = LifecycleError::ImageNotFound("does-not-exist:never".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
