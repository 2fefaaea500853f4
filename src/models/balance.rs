//! Balances and the append-only balance history trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::money::Amount;

/// A user's account balance. One row per user, created lazily with a zero
/// amount on first read. Mutated only inside a store transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    pub user_id: Uuid,
    pub amount: Amount,
    pub last_updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn zero(user_id: Uuid) -> Self {
        Self {
            user_id,
            amount: Amount::ZERO,
            last_updated_at: Utc::now(),
        }
    }

    pub fn has_sufficient(&self, amount: Amount) -> bool {
        self.amount >= amount
    }
}

/// Direction of a committed balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Credit,
    Debit,
    TransferIn,
    TransferOut,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Credit => "CREDIT",
            ChangeType::Debit => "DEBIT",
            ChangeType::TransferIn => "TRANSFER_IN",
            ChangeType::TransferOut => "TRANSFER_OUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREDIT" => Some(ChangeType::Credit),
            "DEBIT" => Some(ChangeType::Debit),
            "TRANSFER_IN" => Some(ChangeType::TransferIn),
            "TRANSFER_OUT" => Some(ChangeType::TransferOut),
            _ => None,
        }
    }

    /// Direction for a single-account adjustment, derived from the sign of
    /// the delta.
    pub fn from_delta(delta: Amount) -> Self {
        if delta.is_negative() {
            ChangeType::Debit
        } else {
            ChangeType::Credit
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per balance-mutating commit. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceHistory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub previous_amount: Amount,
    pub new_amount: Amount,
    pub change_amount: Amount,
    pub change_type: ChangeType,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl BalanceHistory {
    pub fn record(
        user_id: Uuid,
        previous: Amount,
        new: Amount,
        change_type: ChangeType,
        transaction_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            previous_amount: previous,
            new_amount: new,
            change_amount: Amount::from_minor(new.minor_units() - previous.minor_units()),
            change_type,
            transaction_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_amount_is_delta() {
        let row = BalanceHistory::record(
            Uuid::new_v4(),
            Amount::from_minor(1000),
            Amount::from_minor(750),
            ChangeType::Debit,
            None,
        );
        assert_eq!(row.change_amount, Amount::from_minor(-250));
    }

    #[test]
    fn change_type_from_delta_sign() {
        assert_eq!(
            ChangeType::from_delta(Amount::from_minor(5)),
            ChangeType::Credit
        );
        assert_eq!(
            ChangeType::from_delta(Amount::from_minor(-5)),
            ChangeType::Debit
        );
    }

    #[test]
    fn sufficient_balance_check() {
        let mut b = Balance::zero(Uuid::new_v4());
        assert!(b.has_sufficient(Amount::ZERO));
        assert!(!b.has_sufficient(Amount::from_minor(1)));
        b.amount = Amount::from_minor(100);
        assert!(b.has_sufficient(Amount::from_minor(100)));
    }
}
