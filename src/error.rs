use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::REDIS_DATABASE_COUNT;

/// Rejected backend configuration. Never recovered from: a storage
/// handle is only handed out for a configuration that passed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Redis database index {0} out of range, expected 0..{max}", max = REDIS_DATABASE_COUNT)]
    DatabaseIndexOutOfRange(i64),
    #[error("invalid Redis endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: redis::RedisError,
    },
    #[error("expiration must be greater than zero")]
    ZeroExpiration,
}

/// Failure of a single storage operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis operation failed: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("Redis operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Redis operation cancelled")]
    Cancelled,
    #[error("failed to serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidIdentifier {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Malformed composite rule identifier, e.g. missing the `|` separator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid rule identifier {rule:?}: {reason}")]
pub struct RuleIdError {
    pub rule: String,
    pub reason: &'static str,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<RuleIdError> for AppError {
    fn from(err: RuleIdError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
