use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use ledgerd::api::{self, AppState, JwtKeys};
use ledgerd::audit::AuditTrail;
use ledgerd::cache::{Cache, NullCache, RedisCache};
use ledgerd::config::Config;
use ledgerd::core::{AccountLocks, BalanceCore, TransactionCore};
use ledgerd::counters::TransactionCounters;
use ledgerd::store::{PgStore, Store};
use ledgerd::worker::{WorkerPool, WorkerPoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = ledgerd::logging::init_logging(&config.log);

    info!(version = env!("CARGO_PKG_VERSION"), "ledgerd starting");

    // Store is authoritative; a missing database is fatal
    let store = PgStore::connect(&config.database.url())
        .await
        .context("failed to connect to PostgreSQL")?;
    store.init_schema().await.context("failed to init schema")?;
    let store: Arc<dyn Store> = Arc::new(store);

    // Cache is advisory; fall back to a null cache when unreachable
    let cache: Arc<dyn Cache> = match RedisCache::connect(&config.cache.url()).await {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            warn!(error = %err, "cache unreachable, continuing without cache");
            Arc::new(NullCache::new())
        }
    };

    let locks = Arc::new(AccountLocks::new());
    let audit = Arc::new(AuditTrail::new(store.clone()));
    let counters = Arc::new(TransactionCounters::new());

    let balances = Arc::new(BalanceCore::new(
        store.clone(),
        cache.clone(),
        locks.clone(),
        audit.clone(),
    ));
    let transactions = Arc::new(TransactionCore::new(
        store.clone(),
        cache.clone(),
        locks.clone(),
        audit.clone(),
    ));

    let pool = Arc::new(WorkerPool::new(
        transactions.clone(),
        counters.clone(),
        WorkerPoolConfig {
            worker_count: config.workers.count,
            queue_size: config.workers.queue_size,
            shutdown_timeout: Duration::from_secs(config.workers.shutdown_timeout_secs),
        },
    ));

    // Idle advisory locks are reclaimed periodically
    {
        let locks = locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                let pruned = locks.prune_idle();
                if pruned > 0 {
                    tracing::debug!(pruned, "pruned idle account locks");
                }
            }
        });
    }

    // Audit retention job: purge records older than the configured window
    {
        let audit = audit.clone();
        let retention_days = config.audit_retention_days;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            loop {
                interval.tick().await;
                audit.purge_older_than_days(retention_days).await;
            }
        });
    }

    audit.system_activity("STARTUP", "ledgerd started").await;

    let state = Arc::new(AppState {
        store,
        cache,
        balances,
        transactions,
        pool: pool.clone(),
        counters,
        jwt: JwtKeys::from_secret(&config.jwt.secret),
    });

    let shutdown_pool = pool.clone();
    let shutdown = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "shutdown signal listener failed");
        }
        info!("shutdown signal received");
        shutdown_pool.shutdown().await;
    };

    api::run_server(state, &config.server.addr(), shutdown).await?;

    info!("ledgerd stopped");
    Ok(())
}
