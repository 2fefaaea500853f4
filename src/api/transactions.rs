//! Transaction submission and read handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::AuthContext;
use super::state::AppState;
use super::types::{
    accepted, ok, ApiError, ApiResult, DataBody, EntryListResponse, JobAccepted, Pagination,
};
use crate::models::{EntryStatus, EntryType, LedgerEntry};
use crate::money::Amount;
use crate::store::EntryFilter;
use crate::worker::Job;

/// Unknown fields (a `currency` field included) are rejected: the system is
/// single-currency.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DepositRequest {
    pub amount: Amount,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct WithdrawRequest {
    pub amount: Amount,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    pub to_user_id: Uuid,
    pub amount: Amount,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
}

/// Malformed bodies surface as 400s in the standard envelope instead of the
/// framework default.
fn enveloped<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

fn validate_submission(amount: Amount, reference: &Option<String>) -> Result<String, ApiError> {
    amount
        .validate_transaction_amount()
        .map_err(|err| ApiError::validation(err.to_string()))?;

    let reference = reference.clone().unwrap_or_default();
    if reference.len() > 100 {
        return Err(ApiError::validation(
            "reference must be at most 100 characters",
        ));
    }
    Ok(reference)
}

fn handle_of(job: &Job, from: Option<Uuid>, to: Option<Uuid>) -> JobAccepted {
    JobAccepted {
        job_id: job.id,
        from_user_id: from,
        to_user_id: to,
        amount: job.amount,
        status: "processing",
        created_at: job.enqueued_at,
    }
}

/// POST /api/v1/transactions/credit
#[utoipa::path(
    post,
    path = "/api/v1/transactions/credit",
    request_body = DepositRequest,
    responses(
        (status = 202, description = "Credit accepted for processing", body = JobAccepted),
        (status = 400, description = "Invalid amount or reference"),
        (status = 503, description = "Queue full or shutting down")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn submit_credit(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> ApiResult<JobAccepted> {
    let req = enveloped(payload)?;
    let reference = validate_submission(req.amount, &req.reference)?;

    let job = Job::credit(auth.user_id, req.amount, reference);
    let handle = handle_of(&job, None, Some(auth.user_id));
    state.pool.submit(job)?;

    info!(
        job_id = %handle.job_id,
        user_id = %auth.user_id,
        amount = %req.amount,
        "credit submitted"
    );
    accepted(handle)
}

/// POST /api/v1/transactions/debit
///
/// The balance check here is advisory for early rejection; the
/// authoritative check happens inside the worker's store transaction.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/debit",
    request_body = WithdrawRequest,
    responses(
        (status = 202, description = "Debit accepted for processing", body = JobAccepted),
        (status = 400, description = "Invalid amount or insufficient balance"),
        (status = 503, description = "Queue full or shutting down")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn submit_debit(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> ApiResult<JobAccepted> {
    let req = enveloped(payload)?;
    let reference = validate_submission(req.amount, &req.reference)?;

    if !state.transactions.can_cover(auth.user_id, req.amount).await? {
        return Err(ApiError::insufficient_funds("insufficient balance"));
    }

    let job = Job::debit(auth.user_id, req.amount, reference);
    let handle = handle_of(&job, Some(auth.user_id), None);
    state.pool.submit(job)?;

    info!(
        job_id = %handle.job_id,
        user_id = %auth.user_id,
        amount = %req.amount,
        "debit submitted"
    );
    accepted(handle)
}

/// POST /api/v1/transactions/transfer
#[utoipa::path(
    post,
    path = "/api/v1/transactions/transfer",
    request_body = TransferRequest,
    responses(
        (status = 202, description = "Transfer accepted for processing", body = JobAccepted),
        (status = 400, description = "Invalid request, self-transfer or insufficient balance"),
        (status = 503, description = "Queue full or shutting down")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn submit_transfer(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<JobAccepted> {
    let req = enveloped(payload)?;
    let reference = validate_submission(req.amount, &req.reference)?;

    if req.to_user_id == auth.user_id {
        return Err(ApiError::validation("cannot transfer to your own account"));
    }
    if !state.transactions.can_cover(auth.user_id, req.amount).await? {
        return Err(ApiError::insufficient_funds("insufficient balance"));
    }

    let job = Job::transfer(auth.user_id, req.to_user_id, req.amount, reference);
    let handle = handle_of(&job, Some(auth.user_id), Some(req.to_user_id));
    state.pool.submit(job)?;

    info!(
        job_id = %handle.job_id,
        from_user_id = %auth.user_id,
        to_user_id = %req.to_user_id,
        amount = %req.amount,
        "transfer submitted"
    );
    accepted(handle)
}

/// GET /api/v1/transactions/history
#[utoipa::path(
    get,
    path = "/api/v1/transactions/history",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to [1, 100]"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
        ("type" = Option<String>, Query, description = "Filter by entry type"),
        ("status" = Option<String>, Query, description = "Filter by status")
    ),
    responses(
        (status = 200, description = "Transaction history", body = EntryListResponse),
        (status = 400, description = "Unknown type or status filter")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<EntryListResponse> {
    let limit = params.limit.as_deref().and_then(|v| v.parse::<i64>().ok());
    let offset = params.offset.as_deref().and_then(|v| v.parse::<i64>().ok());

    let kind = match params.kind.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            EntryType::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown transaction type: {raw}")))?,
        ),
    };
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            EntryStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status: {raw}")))?,
        ),
    };

    let filter = EntryFilter::new(limit, offset)
        .with_kind(kind)
        .with_status(status);
    let entries = state.transactions.get_history(auth.user_id, &filter).await?;

    ok(EntryListResponse {
        pagination: Pagination {
            limit: filter.limit,
            offset: filter.offset,
            count: entries.len(),
        },
        data: entries,
    })
}

/// GET /api/v1/transactions/{id}
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction", body = DataBody<LedgerEntry>),
        (status = 400, description = "Invalid transaction id"),
        (status = 403, description = "Transaction belongs to another user"),
        (status = 404, description = "Transaction not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<DataBody<LedgerEntry>> {
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::validation("invalid transaction id"))?;

    // Admins may read any entry; everyone else only their own
    let entry = if auth.role.is_admin() {
        state.transactions.get_entry(id).await?
    } else {
        state.transactions.get_entry_for(id, auth.user_id).await?
    };

    ok(DataBody { data: entry })
}
