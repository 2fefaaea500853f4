//! Balance read handlers

use axum::extract::{Query, State};
use axum::Extension;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::auth::AuthContext;
use super::state::AppState;
use super::types::{
    ok, ApiError, ApiResult, BalanceAtData, BalanceHistoryData, CurrentBalanceData, DataBody,
    Pagination, CURRENCY,
};
use crate::store::HistoryFilter;

#[derive(Debug, Deserialize)]
pub struct HistoricalParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AtTimeParams {
    pub timestamp: Option<String>,
}

/// Accepted timestamp shapes: RFC3339, `YYYY-MM-DDTHH:MM:SSZ`,
/// `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// GET /api/v1/balances/current
#[utoipa::path(
    get,
    path = "/api/v1/balances/current",
    responses(
        (status = 200, description = "Current and available balance", body = DataBody<CurrentBalanceData>)
    ),
    security(("bearer_auth" = [])),
    tag = "Balances"
)]
pub async fn get_current_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<DataBody<CurrentBalanceData>> {
    let current = state.balances.get_balance(auth.user_id).await?;
    let available = state.balances.available_balance(auth.user_id).await?;

    ok(DataBody {
        data: CurrentBalanceData {
            user_id: auth.user_id,
            current_balance: current,
            available_balance: available,
            currency: CURRENCY,
            last_updated: Utc::now(),
        },
    })
}

/// GET /api/v1/balances/historical
#[utoipa::path(
    get,
    path = "/api/v1/balances/historical",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, clamped to [1, 100]"),
        ("offset" = Option<i64>, Query, description = "Page offset"),
        ("start_date" = Option<String>, Query, description = "Window start (inclusive)"),
        ("end_date" = Option<String>, Query, description = "Window end (inclusive)")
    ),
    responses(
        (status = 200, description = "Balance history", body = DataBody<BalanceHistoryData>),
        (status = 400, description = "Invalid date bound")
    ),
    security(("bearer_auth" = [])),
    tag = "Balances"
)]
pub async fn get_historical_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<HistoricalParams>,
) -> ApiResult<DataBody<BalanceHistoryData>> {
    let limit = params.limit.as_deref().and_then(|v| v.parse::<i64>().ok());
    let offset = params.offset.as_deref().and_then(|v| v.parse::<i64>().ok());

    let start = match params.start_date.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            parse_timestamp(raw).ok_or_else(|| ApiError::validation("invalid start_date format"))?,
        ),
    };
    let end = match params.end_date.as_deref() {
        None | Some("") => None,
        Some(raw) => {
            Some(parse_timestamp(raw).ok_or_else(|| ApiError::validation("invalid end_date format"))?)
        }
    };

    let filter = HistoryFilter::new(limit, offset).between(start, end);
    let history = state
        .balances
        .get_balance_history(auth.user_id, &filter)
        .await?;

    info!(
        user_id = %auth.user_id,
        count = history.len(),
        "balance history retrieved"
    );

    ok(DataBody {
        data: BalanceHistoryData {
            user_id: auth.user_id,
            pagination: Pagination {
                limit: filter.limit,
                offset: filter.offset,
                count: history.len(),
            },
            history,
        },
    })
}

/// GET /api/v1/balances/at-time
#[utoipa::path(
    get,
    path = "/api/v1/balances/at-time",
    params(("timestamp" = String, Query, description = "Point in time to derive the balance at")),
    responses(
        (status = 200, description = "Balance derived from history", body = DataBody<BalanceAtData>),
        (status = 400, description = "Missing or invalid timestamp")
    ),
    security(("bearer_auth" = [])),
    tag = "Balances"
)]
pub async fn get_balance_at_time(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<AtTimeParams>,
) -> ApiResult<DataBody<BalanceAtData>> {
    let raw = params
        .timestamp
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation("timestamp parameter required"))?;
    let timestamp =
        parse_timestamp(raw).ok_or_else(|| ApiError::validation("invalid timestamp format"))?;

    let (balance, calculated) = state.balances.balance_at(auth.user_id, timestamp).await?;

    ok(DataBody {
        data: BalanceAtData {
            user_id: auth.user_id,
            timestamp,
            balance,
            currency: CURRENCY,
            calculated,
        },
    })
}
