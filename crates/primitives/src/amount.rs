//! Monetary amounts as exact decimals with satoshi (8 digit) precision.
//!
//! Every balance column and every wire amount in the system goes through
//! [`Amount`]. The inner representation is a [`Decimal`] constrained to the
//! range of a `DECIMAL(18,8)` column, so arithmetic is exact and values
//! round-trip through JSON and SQL without drifting. Ledger deltas are
//! signed; non-negativity of wallet columns is a ledger-level invariant, not
//! a property of this type.

use std::fmt::{self, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fractional digits carried by every amount.
pub const AMOUNT_SCALE: u32 = 8;

/// Magnitude bound of a `DECIMAL(18,8)` column.
const MAX_MAGNITUDE: Decimal = dec!(10_000_000_000);

/// Errors that can occur when constructing an [`Amount`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount carries more than {AMOUNT_SCALE} fractional digits")]
    ExcessPrecision,

    #[error("amount exceeds 18 total digits")]
    OutOfRange,
}

/// An exact monetary amount with at most [`AMOUNT_SCALE`] fractional digits.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Constructs an amount, rejecting values a `DECIMAL(18,8)` column could
    /// not hold exactly.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        let normalized = value.normalize();
        if normalized.scale() > AMOUNT_SCALE {
            return Err(AmountError::ExcessPrecision);
        }
        if normalized.abs() >= MAX_MAGNITUDE {
            return Err(AmountError::OutOfRange);
        }
        Ok(Self(normalized))
    }

    /// Quantizes an arbitrary-precision decimal to 8 fractional digits using
    /// banker's rounding. This is the only rounding mode in the system; it is
    /// applied when persisting computed values such as fee shares.
    pub fn rounded(value: Decimal) -> Result<Self, AmountError> {
        Self::new(value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven))
    }

    pub fn to_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dec = Decimal::from_str(s).map_err(|_| AmountError::OutOfRange)?;
        Self::new(dec)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

// Sums of in-range amounts stay far inside Decimal's 96-bit mantissa, so the
// operator impls do not need checked arithmetic.
impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).sum())
    }
}
