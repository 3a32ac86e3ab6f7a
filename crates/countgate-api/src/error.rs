//! Gateway error taxonomy and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use countgate_core::ValidationError;
use countgate_store::StoreError;
use serde::Serialize;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad key, value, or amount. Never reaches the store.
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error("Key not found")]
    NotFound { key: String },

    /// Increment/decrement against a value that is not an integer.
    #[error("value at key {key:?} is not an integer")]
    NotNumeric { key: String },

    #[error("service unavailable: {detail}")]
    StoreUnavailable { key: Option<String>, detail: String },

    #[error("database error: {detail}")]
    Store { key: Option<String>, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Translate a store failure, attributing type errors to `key`.
    pub fn from_store(key: Option<&str>, e: StoreError) -> Self {
        match e {
            StoreError::NotInteger(k) => GatewayError::NotNumeric {
                key: key.map(str::to_string).unwrap_or(k),
            },
            e if e.is_unavailable() => GatewayError::StoreUnavailable {
                key: key.map(str::to_string),
                detail: e.to_string(),
            },
            e => GatewayError::Store {
                key: key.map(str::to_string),
                detail: e.to_string(),
            },
        }
    }

    /// The key the failed operation was about, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            GatewayError::NotFound { key } | GatewayError::NotNumeric { key } => Some(key),
            GatewayError::StoreUnavailable { key, .. } | GatewayError::Store { key, .. } => {
                key.as_deref()
            }
            GatewayError::InvalidInput(_) | GatewayError::Internal(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::NotNumeric { .. } => StatusCode::CONFLICT,
            GatewayError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Store { .. } | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the caller. Store and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::StoreUnavailable { .. } => "Service unavailable".to_string(),
            GatewayError::Store { .. } => "Database error".to_string(),
            GatewayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        GatewayError::from_store(None, e)
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = GatewayError::from(ValidationError::EmptyKey);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "key must not be empty");
    }

    #[test]
    fn store_errors_are_classified() {
        let err = GatewayError::from(StoreError::Unavailable("refused".to_string()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = GatewayError::from(StoreError::Write("disk full".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Database error");

        let err = GatewayError::from_store(Some("k"), StoreError::NotInteger("k".to_string()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn store_failures_remember_the_key() {
        let err = GatewayError::from_store(
            Some("visits"),
            StoreError::Unavailable("connection refused".to_string()),
        );
        assert_eq!(err.key(), Some("visits"));
        assert!(err.to_string().contains("connection refused"));

        let err = GatewayError::from_store(Some("visits"), StoreError::Read("torn page".to_string()));
        assert_eq!(err.key(), Some("visits"));
        assert_eq!(err.public_message(), "Database error");

        let err = GatewayError::from(StoreError::Write("disk full".to_string()));
        assert_eq!(err.key(), None);
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = GatewayError::Internal("secret stack trace".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("secret"));
    }

    #[test]
    fn not_found_message() {
        let err = GatewayError::NotFound {
            key: "nope".to_string(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "Key not found");
    }
}
