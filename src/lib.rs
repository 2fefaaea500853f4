//! ledgerd - Money-Movement Backend
//!
//! A transactional core that accepts credit, debit and transfer requests
//! against per-user balances, persists ledger entries, maintains balance
//! history, caches hot state, and returns job handles to asynchronous
//! callers.
//!
//! # Modules
//!
//! - [`money`] - Fixed-point amounts in integer minor units
//! - [`models`] - Users, ledger entries, balances, audit records
//! - [`store`] - Durable ledger (PostgreSQL + in-memory test double)
//! - [`cache`] - Read-through / write-invalidate KV layer (Redis)
//! - [`counters`] - Lock-free transaction aggregates
//! - [`core`] - Balance and transaction cores
//! - [`worker`] - Bounded job queue and worker pool
//! - [`audit`] - Append-only audit trail
//! - [`users`] - User registration, roles, soft deletion
//! - [`api`] - HTTP submission and read surface
//! - [`config`] - Environment-driven configuration

pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod core;
pub mod counters;
pub mod logging;
pub mod models;
pub mod money;
pub mod store;
pub mod users;
pub mod worker;

// Convenient re-exports at crate root
pub use api::{AppState, JwtKeys};
pub use audit::AuditTrail;
pub use cache::{Cache, MemoryCache, NullCache, RedisCache};
pub use config::Config;
pub use self::core::{AccountLocks, BalanceCore, CoreError, TransactionCore};
pub use counters::TransactionCounters;
pub use models::{Balance, BalanceHistory, EntryStatus, EntryType, LedgerEntry, User, UserRole};
pub use money::Amount;
pub use store::{MemoryStore, PgStore, Store};
pub use users::UserDirectory;
pub use worker::{Job, WorkerPool, WorkerPoolConfig};
