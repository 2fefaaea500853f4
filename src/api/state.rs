//! Shared application state

use std::sync::Arc;

use super::auth::JwtKeys;
use crate::cache::Cache;
use crate::core::{BalanceCore, TransactionCore};
use crate::counters::TransactionCounters;
use crate::store::Store;
use crate::worker::WorkerPool;

/// Everything the handlers need, constructed once at startup and threaded
/// through; no process-wide globals.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub balances: Arc<BalanceCore>,
    pub transactions: Arc<TransactionCore>,
    pub pool: Arc<WorkerPool>,
    pub counters: Arc<TransactionCounters>,
    pub jwt: JwtKeys,
}
