//! Data models for the money-movement core

pub mod audit;
pub mod balance;
pub mod ledger;
pub mod user;

pub use audit::AuditRecord;
pub use balance::{Balance, BalanceHistory, ChangeType};
pub use ledger::{EntryStatus, EntryType, LedgerEntry, StatusTransitionError};
pub use user::{User, UserRole};
