//! Liveness surface

use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::state::AppState;
use super::types::{ok, ApiResult};
use crate::cache::CacheStatsSnapshot;
use crate::counters::CountersSnapshot;
use crate::worker::PoolStats;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
    #[schema(value_type = Object)]
    pub transactions: CountersSnapshot,
    #[schema(value_type = Object)]
    pub cache_stats: CacheStatsSnapshot,
    #[schema(value_type = Object)]
    pub worker_pool: PoolStats,
}

/// GET /api/v1/health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service health and counters", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let database = match state.store.ping().await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    let cache = match state.cache.ping().await {
        Ok(()) => "up",
        Err(_) => "down",
    };

    ok(HealthResponse {
        status: if database == "up" { "ok" } else { "degraded" },
        database,
        cache,
        transactions: state.counters.snapshot(),
        cache_stats: state.cache.stats(),
        worker_pool: state.pool.stats(),
    })
}
