//! Money Representation
//!
//! Unified conversion between the internal minor-unit representation and the
//! client-facing JSON/SQL representations. All monetary arithmetic MUST go
//! through this module.
//!
//! ## Internal Representation
//! - Amounts are stored as `i64` minor units with exactly two fractional
//!   digits (1 unit = 0.01 of the currency)
//! - SQL columns are `NUMERIC(15,2)`, bound through `rust_decimal::Decimal`
//! - JSON carries plain numbers with at most two fractional digits; anything
//!   finer is rejected at deserialization

use rust_decimal::prelude::*;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest amount a single transaction may move: 1,000,000.00.
pub const MAX_TRANSACTION_AMOUNT: Amount = Amount(100_000_000);

/// A signed monetary amount in minor units (two fractional digits).
///
/// The inner value is private to force construction through audited
/// conversion paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("amount has more than two fractional digits: {0}")]
    TooPrecise(Decimal),

    #[error("amount out of representable range: {0}")]
    OutOfRange(Decimal),

    #[error("not a valid decimal amount: {0}")]
    Unparsable(String),
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Construct from raw minor units (e.g. `12345` == `123.45`).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }

    /// Convert to the `Decimal` used at the SQL boundary (scale 2).
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Convert from a `Decimal`, rejecting more than two fractional digits.
    pub fn try_from_decimal(d: Decimal) -> Result<Self, MoneyError> {
        if d.round_dp(2).normalize() != d.normalize() {
            return Err(MoneyError::TooPrecise(d));
        }
        let minor = d
            .checked_mul(Decimal::new(100, 0))
            .and_then(|m| m.trunc().to_i64())
            .ok_or(MoneyError::OutOfRange(d))?;
        Ok(Self(minor))
    }

    /// Validate an amount for use in a ledger transaction: strictly positive
    /// and no larger than [`MAX_TRANSACTION_AMOUNT`].
    pub fn validate_transaction_amount(self) -> Result<Self, MoneyError> {
        if !self.is_positive() || self > MAX_TRANSACTION_AMOUNT {
            return Err(MoneyError::OutOfRange(self.to_decimal()));
        }
        Ok(self)
    }
}

// Amounts appear as plain numbers in the API schema
impl utoipa::PartialSchema for Amount {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        utoipa::openapi::schema::ObjectBuilder::new()
            .schema_type(utoipa::openapi::schema::Type::Number)
            .into()
    }
}

impl utoipa::ToSchema for Amount {}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let d = Decimal::from_str(s).map_err(|_| MoneyError::Unparsable(s.to_string()))?;
        Self::try_from_decimal(d)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Minor units stay far below 2^53, so this division is exact in the
        // integer part and shortest-round-trip printing keeps two digits.
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number with at most two fractional digits")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                let d = Decimal::from_f64(v)
                    .ok_or_else(|| E::custom(format!("not a finite amount: {v}")))?;
                Amount::try_from_decimal(d).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                v.checked_mul(100)
                    .map(Amount)
                    .ok_or_else(|| E::custom(format!("amount out of range: {v}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(100))
                    .map(Amount)
                    .ok_or_else(|| E::custom(format!("amount out of range: {v}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_unit_round_trip() {
        let a = Amount::from_minor(12345);
        assert_eq!(a.to_decimal(), Decimal::new(12345, 2));
        assert_eq!(Amount::try_from_decimal(a.to_decimal()).unwrap(), a);
        assert_eq!(a.to_string(), "123.45");
    }

    #[test]
    fn rejects_three_fractional_digits() {
        let d = Decimal::from_str("10.001").unwrap();
        assert!(matches!(
            Amount::try_from_decimal(d),
            Err(MoneyError::TooPrecise(_))
        ));
    }

    #[test]
    fn accepts_trailing_zero_scales() {
        // 10.10 and 10.1 are the same amount
        let a = Amount::from_str("10.10").unwrap();
        let b = Amount::from_str("10.1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.minor_units(), 1010);
    }

    #[test]
    fn transaction_amount_bounds() {
        assert!(Amount::from_minor(0).validate_transaction_amount().is_err());
        assert!(Amount::from_minor(-100)
            .validate_transaction_amount()
            .is_err());
        assert!(Amount::from_minor(1).validate_transaction_amount().is_ok());
        assert!(MAX_TRANSACTION_AMOUNT.validate_transaction_amount().is_ok());
        assert!(Amount::from_minor(100_000_001)
            .validate_transaction_amount()
            .is_err());
    }

    #[test]
    fn json_round_trip() {
        let a: Amount = serde_json::from_str("100.25").unwrap();
        assert_eq!(a.minor_units(), 10025);
        assert_eq!(serde_json::to_string(&a).unwrap(), "100.25");

        let whole: Amount = serde_json::from_str("50").unwrap();
        assert_eq!(whole.minor_units(), 5000);
    }

    #[test]
    fn json_rejects_sub_cent_precision() {
        assert!(serde_json::from_str::<Amount>("0.001").is_err());
    }

    #[test]
    fn checked_arithmetic() {
        let a = Amount::from_minor(i64::MAX);
        assert!(a.checked_add(Amount::from_minor(1)).is_none());
        assert_eq!(
            Amount::from_minor(500).checked_sub(Amount::from_minor(200)),
            Some(Amount::from_minor(300))
        );
    }

    #[test]
    fn display_negative() {
        assert_eq!(Amount::from_minor(-50).to_string(), "-0.50");
    }
}
