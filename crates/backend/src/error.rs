//! Unified error handling for the backend API.
//!
//! This module provides a centralized error type that implements `IntoResponse`,
//! allowing handlers to use `?` operator naturally while returning appropriate
//! HTTP status codes and error messages. Ingestion runs carry their own typed
//! taxonomy (`IngestError`) so callers can tell a retryable rejection apart
//! from a credential problem.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Run-level errors surfaced by an ingestion run.
///
/// Item-level failures (a single unparseable message, one rejected task
/// candidate, one failed commit) are contained inside the run and never
/// appear here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Admission denied by the rate gate. Safe to retry after the window.
    #[error("Rate limit exceeded. Limit: {limit} per {window_secs} seconds")]
    RateLimited { limit: usize, window_secs: u64 },

    /// Credential missing, undecryptable, or unrefreshable. The user must
    /// reconnect their Gmail account.
    #[error("Gmail authorization required: {0}")]
    Auth(String),

    /// The mail provider failed at the batch level (listing, quota, timeout).
    /// The whole run is aborted; retrying later is safe thanks to the
    /// `(user_id, gmail_id)` idempotency guard.
    #[error("Mail provider error: {0}")]
    Provider(String),

    /// Storage or other internal failure at run level.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Database connection pool error
    #[error("Database connection error")]
    ConnectionPool(#[source] diesel_async::pooled_connection::deadpool::PoolError),

    /// Database query error
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Generic database/anyhow error
    #[error("{0}")]
    Internal(#[from] anyhow::Error),

    /// Ingestion run rejected or aborted
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Environment variable missing
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Create a not found error with a custom message
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for ApiError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        ApiError::ConnectionPool(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            ApiError::ConnectionPool(e) => {
                tracing::error!("Connection pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database connection unavailable".to_string(),
                    None,
                )
            }
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                match e {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        "Resource not found".to_string(),
                        None,
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Database operation failed".to_string(),
                        None,
                    ),
                }
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(e.to_string()),
                )
            }
            ApiError::Ingest(e) => match e {
                IngestError::RateLimited { .. } => {
                    (StatusCode::TOO_MANY_REQUESTS, e.to_string(), None)
                }
                IngestError::Auth(_) => (StatusCode::UNAUTHORIZED, e.to_string(), None),
                IngestError::Provider(_) => (StatusCode::BAD_GATEWAY, e.to_string(), None),
                IngestError::Internal(inner) => {
                    tracing::error!("Ingestion internal error: {:?}", inner);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Ingestion failed".to_string(),
                        Some(inner.to_string()),
                    )
                }
            },
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                format!("{} not found", resource),
                None,
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
