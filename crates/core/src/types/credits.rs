//! Credit amounts using decimal arithmetic.
//!
//! Credits are the internal currency of the store. They are never negative,
//! carry at most two decimal places, and fit the `NUMERIC(12,2)` columns that
//! hold balances, prices, and order totals.

use core::fmt;
use core::iter::Sum;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Errors that can occur when constructing [`Credits`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CreditsError {
    /// The amount is below zero.
    #[error("credit amount cannot be negative")]
    Negative,
    /// The amount has more than two decimal places.
    #[error("credit amount must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum number of decimal places.
        max: u32,
    },
    /// The amount does not fit the storage column.
    #[error("credit amount exceeds {max}")]
    TooLarge {
        /// Largest storable amount.
        max: Decimal,
    },
    /// The input is not a decimal number.
    #[error("invalid credit amount: {0}")]
    Invalid(String),
}

/// A non-negative amount of credits.
///
/// ## Examples
///
/// ```
/// use ec_space_core::{Credits, Quantity};
///
/// let price: Credits = "50.00".parse().unwrap();
/// let total = price.checked_mul(Quantity::new(2).unwrap()).unwrap();
/// assert_eq!(total, "100".parse().unwrap());
///
/// assert!("-1".parse::<Credits>().is_err());
/// assert!("0.001".parse::<Credits>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Credits(Decimal);

impl Credits {
    /// Number of decimal places credits are stored with.
    pub const SCALE: u32 = 2;

    /// Zero credits.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest amount that fits `NUMERIC(12,2)`.
    #[must_use]
    pub fn max_value() -> Decimal {
        Decimal::new(999_999_999_999, Self::SCALE)
    }

    /// Create a credit amount from a decimal.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative, has more than two decimal
    /// places, or exceeds [`Credits::max_value`].
    pub fn new(amount: Decimal) -> Result<Self, CreditsError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CreditsError::Negative);
        }
        if amount.normalize().scale() > Self::SCALE {
            return Err(CreditsError::TooPrecise { max: Self::SCALE });
        }
        let max = Self::max_value();
        if amount > max {
            return Err(CreditsError::TooLarge { max });
        }
        Ok(Self(amount.abs()))
    }

    /// Create a credit amount from a whole number of hundredths.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or too large.
    pub fn from_cents(cents: i64) -> Result<Self, CreditsError> {
        Self::new(Decimal::new(cents, Self::SCALE))
    }

    /// Returns `true` for a zero amount.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add two amounts, returning `None` if the result does not fit.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).and_then(|sum| Self::new(sum).ok())
    }

    /// Subtract `other`, returning `None` if the result would be negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        if other.0 > self.0 {
            return None;
        }
        Some(Self(self.0 - other.0))
    }

    /// Extended price of `quantity` units at this unit price.
    #[must_use]
    pub fn checked_mul(self, quantity: Quantity) -> Option<Self> {
        self.0
            .checked_mul(Decimal::from(quantity.get()))
            .and_then(|product| Self::new(product).ok())
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::str::FromStr for Credits {
    type Err = CreditsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str_exact(s.trim())
            .map_err(|e| CreditsError::Invalid(e.to_string()))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Credits {
    type Error = CreditsError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Credits> for Decimal {
    fn from(credits: Credits) -> Self {
        credits.0
    }
}

impl Sum for Credits {
    /// Sums amounts, saturating at the storage maximum.
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, c| {
            acc.checked_add(c).unwrap_or(Self(Self::max_value()))
        })
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Credits {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Credits {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Credits {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
