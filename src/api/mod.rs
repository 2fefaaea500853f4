//! HTTP surface
//!
//! Submission and read endpoints for the transaction core. Authentication,
//! rate limiting and the security header stack are external collaborators;
//! the auth middleware here implements only the token → `{user_id, role}`
//! contract.

pub mod auth;
pub mod balances;
pub mod health;
pub mod state;
pub mod transactions;
pub mod types;

use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use auth::{AuthContext, JwtKeys};
pub use state::AppState;

/// Assemble the v1 router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/transactions/credit", post(transactions::submit_credit))
        .route("/transactions/debit", post(transactions::submit_debit))
        .route("/transactions/transfer", post(transactions::submit_transfer))
        .route("/transactions/history", get(transactions::get_history))
        .route("/transactions/{id}", get(transactions::get_transaction))
        .route("/balances/current", get(balances::get_current_balance))
        .route("/balances/historical", get(balances::get_historical_balance))
        .route("/balances/at-time", get(balances::get_balance_at_time))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1", protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn run_server(
    state: Arc<AppState>,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
