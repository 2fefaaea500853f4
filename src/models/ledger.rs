//! Ledger entries and their status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::money::Amount;

/// Kind of money movement a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Transfer,
    Deposit,
    Withdraw,
    Payment,
    Refund,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Transfer => "transfer",
            EntryType::Deposit => "deposit",
            EntryType::Withdraw => "withdraw",
            EntryType::Payment => "payment",
            EntryType::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transfer" => Some(EntryType::Transfer),
            "deposit" => Some(EntryType::Deposit),
            "withdraw" => Some(EntryType::Withdraw),
            "payment" => Some(EntryType::Payment),
            "refund" => Some(EntryType::Refund),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger entry.
///
/// Legal edges: pending -> {completed, failed, cancelled},
/// completed -> refund. Failed and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refund,
}

#[derive(Debug, Error, PartialEq)]
#[error("illegal status transition {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: EntryStatus,
    pub to: EntryStatus,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
            EntryStatus::Cancelled => "cancelled",
            EntryStatus::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "completed" => Some(EntryStatus::Completed),
            "failed" => Some(EntryStatus::Failed),
            "cancelled" => Some(EntryStatus::Cancelled),
            "refund" => Some(EntryStatus::Refund),
            _ => None,
        }
    }

    pub fn can_transition_to(self, target: EntryStatus) -> bool {
        match self {
            EntryStatus::Pending => matches!(
                target,
                EntryStatus::Completed | EntryStatus::Failed | EntryStatus::Cancelled
            ),
            EntryStatus::Completed => target == EntryStatus::Refund,
            EntryStatus::Failed | EntryStatus::Cancelled | EntryStatus::Refund => false,
        }
    }

    pub fn transition_to(self, target: EntryStatus) -> Result<EntryStatus, StatusTransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(StatusTransitionError {
                from: self,
                to: target,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryStatus::Failed | EntryStatus::Cancelled | EntryStatus::Refund
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record of an attempted or completed money movement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build a pending deposit entry (`from` empty, `to` set).
    pub fn deposit(to: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self::pending(None, Some(to), amount, EntryType::Deposit, reference)
    }

    /// Build a pending withdrawal entry (`from` set, `to` empty).
    pub fn withdraw(from: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self::pending(Some(from), None, amount, EntryType::Withdraw, reference)
    }

    /// Build a pending transfer entry (both accounts set).
    pub fn transfer(from: Uuid, to: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self::pending(Some(from), Some(to), amount, EntryType::Transfer, reference)
    }

    fn pending(
        from_user_id: Option<Uuid>,
        to_user_id: Option<Uuid>,
        amount: Amount,
        kind: EntryType,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_user_id,
            to_user_id,
            amount,
            kind,
            status: EntryStatus::Pending,
            reference: reference.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether `user` is a party to this entry.
    pub fn involves(&self, user: Uuid) -> bool {
        self.from_user_id == Some(user) || self.to_user_id == Some(user)
    }

    pub fn mark(&mut self, target: EntryStatus) -> Result<(), StatusTransitionError> {
        self.status = self.status.transition_to(target)?;
        Ok(())
    }

    /// Check the per-type account invariants and the amount bounds.
    pub fn validate(&self) -> Result<(), String> {
        self.amount
            .validate_transaction_amount()
            .map_err(|e| e.to_string())?;

        if self.reference.len() > 100 {
            return Err("reference must be at most 100 characters".to_string());
        }

        match self.kind {
            EntryType::Deposit => {
                if self.from_user_id.is_some() || self.to_user_id.is_none() {
                    return Err("deposit requires a receiver and no sender".to_string());
                }
            }
            EntryType::Withdraw => {
                if self.from_user_id.is_none() || self.to_user_id.is_some() {
                    return Err("withdrawal requires a sender and no receiver".to_string());
                }
            }
            EntryType::Transfer => {
                let (Some(from), Some(to)) = (self.from_user_id, self.to_user_id) else {
                    return Err("transfer requires both sender and receiver".to_string());
                };
                if from == to {
                    return Err("cannot transfer to the same account".to_string());
                }
            }
            EntryType::Payment | EntryType::Refund => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(EntryStatus::Pending.can_transition_to(EntryStatus::Completed));
        assert!(EntryStatus::Pending.can_transition_to(EntryStatus::Failed));
        assert!(EntryStatus::Pending.can_transition_to(EntryStatus::Cancelled));
        assert!(EntryStatus::Completed.can_transition_to(EntryStatus::Refund));
    }

    #[test]
    fn illegal_transitions_rejected() {
        for terminal in [
            EntryStatus::Failed,
            EntryStatus::Cancelled,
            EntryStatus::Refund,
        ] {
            for target in [
                EntryStatus::Pending,
                EntryStatus::Completed,
                EntryStatus::Failed,
                EntryStatus::Cancelled,
                EntryStatus::Refund,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert_eq!(
            EntryStatus::Completed.transition_to(EntryStatus::Pending),
            Err(StatusTransitionError {
                from: EntryStatus::Completed,
                to: EntryStatus::Pending,
            })
        );
    }

    #[test]
    fn deposit_shape_enforced() {
        let mut entry = LedgerEntry::deposit(Uuid::new_v4(), Amount::from_minor(1000), "");
        assert!(entry.validate().is_ok());

        entry.from_user_id = Some(Uuid::new_v4());
        assert!(entry.validate().is_err());
    }

    #[test]
    fn self_transfer_rejected() {
        let user = Uuid::new_v4();
        let entry = LedgerEntry::transfer(user, user, Amount::from_minor(100), "");
        assert!(entry.validate().is_err());
    }

    #[test]
    fn amount_bounds_enforced() {
        let entry = LedgerEntry::deposit(Uuid::new_v4(), Amount::ZERO, "");
        assert!(entry.validate().is_err());

        let entry = LedgerEntry::deposit(Uuid::new_v4(), Amount::from_minor(100_000_001), "");
        assert!(entry.validate().is_err());
    }

    #[test]
    fn long_reference_rejected() {
        let entry = LedgerEntry::deposit(Uuid::new_v4(), Amount::from_minor(100), "x".repeat(101));
        assert!(entry.validate().is_err());
    }

    #[test]
    fn mark_updates_status() {
        let mut entry = LedgerEntry::deposit(Uuid::new_v4(), Amount::from_minor(100), "");
        entry.mark(EntryStatus::Completed).unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        assert!(entry.mark(EntryStatus::Pending).is_err());
    }
}
