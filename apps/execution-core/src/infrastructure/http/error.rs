//! API error type and its mapping to HTTP status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::services::{IdempotencyError, SupervisorError};
use crate::application::use_cases::{
    ExecutionError, ExitRetryError, PanicError, ReconciliationError, TradeLifecycleError,
};
use crate::domain::shared::RepositoryError;

/// Error returned by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// No such resource for this caller.
    #[error("{0}")]
    NotFound(String),

    /// Concurrent or duplicate request.
    #[error("{0}")]
    Conflict(String),

    /// Well-formed but not acceptable.
    #[error("{0}")]
    Unprocessable(String),

    /// A dependency is down.
    #[error("{0}")]
    Unavailable(String),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Request failed");
        } else {
            tracing::debug!(%status, error = %self, "Request refused");
        }
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound { .. } => Self::NotFound(e.to_string()),
            RepositoryError::Duplicate { .. } | RepositoryError::StaleState { .. } => {
                Self::Conflict(e.to_string())
            }
            RepositoryError::Storage(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Invalid(_) => Self::BadRequest(e.to_string()),
            ExecutionError::Repository(inner) => inner.into(),
            ExecutionError::Broker(_) | ExecutionError::Port(_) | ExecutionError::Risk(_) => {
                Self::Unavailable(e.to_string())
            }
            ExecutionError::Order(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<TradeLifecycleError> for ApiError {
    fn from(e: TradeLifecycleError) -> Self {
        match e {
            TradeLifecycleError::NotFound(_) => Self::NotFound(e.to_string()),
            TradeLifecycleError::EntryNotFilled { .. } | TradeLifecycleError::Trade(_) => {
                Self::Unprocessable(e.to_string())
            }
            TradeLifecycleError::Contended(_) => Self::Conflict(e.to_string()),
            TradeLifecycleError::Repository(inner) => inner.into(),
            TradeLifecycleError::Order(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ExitRetryError> for ApiError {
    fn from(e: ExitRetryError) -> Self {
        match e {
            ExitRetryError::Lifecycle(inner) => inner.into(),
            ExitRetryError::Repository(inner) => inner.into(),
            ExitRetryError::Request(_) => Self::Conflict(e.to_string()),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::Contended { .. } => Self::Conflict(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<PanicError> for ApiError {
    fn from(e: PanicError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<ReconciliationError> for ApiError {
    fn from(e: ReconciliationError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<IdempotencyError<Self>> for ApiError {
    fn from(e: IdempotencyError<Self>) -> Self {
        match e {
            IdempotencyError::Operation(inner) => inner,
            IdempotencyError::PayloadMismatch { .. } => Self::Unprocessable(e.to_string()),
            IdempotencyError::InProgress { .. } | IdempotencyError::ReplayedFailure { .. } => {
                Self::Conflict(e.to_string())
            }
            IdempotencyError::Storage(_) => Self::Internal(e.to_string()),
        }
    }
}
