//! API response types and the error envelope
//!
//! Every error response carries the same JSON envelope:
//! `{"error": "<kind>", "message": "...", "code"?, "retry_after"?, "details"?}`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::CoreError;
use crate::models::{BalanceHistory, LedgerEntry};
use crate::money::Amount;
use crate::worker::SubmitError;

/// Handler return type: success tuple or enveloped error.
pub type ApiResult<T> = Result<(StatusCode, Json<T>), ApiError>;

#[inline]
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(data)))
}

#[inline]
pub fn accepted<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::ACCEPTED, Json(data)))
}

/// Machine-readable error kinds surfaced in the envelope.
pub mod kinds {
    pub const VALIDATION: &str = "validation";
    pub const AUTHENTICATION: &str = "authentication";
    pub const AUTHORIZATION: &str = "authorization";
    pub const INSUFFICIENT_FUNDS: &str = "insufficient_funds";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const INTERNAL: &str = "internal";
    pub const QUEUE_FULL: &str = "queue_full";
    pub const SHUTDOWN: &str = "shutdown";
}

#[derive(Debug, Serialize, ToSchema)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

/// Unified API error with automatic `IntoResponse`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    code: Option<String>,
    retry_after: Option<i64>,
    details: Option<Vec<String>>,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            code: None,
            retry_after: None,
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, kinds::VALIDATION, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, kinds::AUTHENTICATION, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, kinds::AUTHORIZATION, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, kinds::INSUFFICIENT_FUNDS, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, kinds::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, kinds::CONFLICT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, kinds::UNAVAILABLE, message)
            .with_retry_after(30)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, kinds::INTERNAL, message)
    }

    pub fn queue_full() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            kinds::QUEUE_FULL,
            "job queue is full, try again later",
        )
        .with_retry_after(30)
    }

    pub fn shutting_down() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            kinds::SHUTDOWN,
            "service is shutting down",
        )
    }

    /// Attach an absolute retry hint `seconds` from now (epoch seconds).
    pub fn with_retry_after(mut self, seconds: i64) -> Self {
        self.retry_after = Some(Utc::now().timestamp() + seconds);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Validation(_) => Self::validation(err.to_string()),
            CoreError::InsufficientFunds { .. } => Self::insufficient_funds(err.to_string()),
            CoreError::NotFound(_) => Self::not_found(err.to_string()),
            CoreError::Forbidden(_) => Self::forbidden(err.to_string()),
            CoreError::Conflict(_) => Self::conflict(err.to_string()),
            CoreError::Unavailable(_) => Self::unavailable(err.to_string()),
            CoreError::Internal(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::QueueFull => Self::queue_full(),
            SubmitError::Shutdown => Self::shutting_down(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody {
            error: self.kind,
            message: self.message,
            code: self.code,
            retry_after: self.retry_after,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Single-object success wrapper.
#[derive(Debug, Serialize, ToSchema)]
pub struct DataBody<T> {
    pub data: T,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

/// 202 body returned when a job is accepted. Not a promise: the outcome is
/// observed by polling the eventual ledger row.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobAccepted {
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<Uuid>,
    pub amount: Amount,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EntryListResponse {
    pub data: Vec<LedgerEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentBalanceData {
    pub user_id: Uuid,
    pub current_balance: Amount,
    pub available_balance: Amount,
    pub currency: &'static str,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceHistoryData {
    pub user_id: Uuid,
    pub history: Vec<BalanceHistory>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceAtData {
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub balance: Amount,
    pub currency: &'static str,
    pub calculated: bool,
}

/// Single currency for every response.
pub const CURRENCY: &str = "TRY";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_mapping() {
        let err: ApiError = CoreError::Validation("bad".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), kinds::VALIDATION);

        let err: ApiError = CoreError::InsufficientFunds {
            available: Amount::ZERO,
            requested: Amount::from_minor(100),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), kinds::INSUFFICIENT_FUNDS);

        let err: ApiError = CoreError::NotFound("transaction").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = CoreError::Unavailable("db".into()).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn submit_error_mapping() {
        let err: ApiError = SubmitError::QueueFull.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind(), kinds::QUEUE_FULL);

        let err: ApiError = SubmitError::Shutdown.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind(), kinds::SHUTDOWN);
    }

    #[test]
    fn envelope_shape() {
        let err = ApiError::validation("amount must be positive").with_code("AMT_RANGE");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
