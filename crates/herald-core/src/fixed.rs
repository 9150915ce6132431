//! Fixed-point share units.
//!
//! Fair-share quantities are carried as unsigned 128-bit integers scaled by
//! [`SCALE`]. No floating point is used anywhere in the accounting path.
//! Every operation is checked; overflow surfaces as
//! [`AccountingError::Overflow`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AccountingError;

/// Fixed-point scale factor (10^7).
pub const SCALE: u128 = 10_000_000;

/// A fixed-point quantity of share units (raw value = whole * SCALE).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShareUnits(pub u128);

impl ShareUnits {
    /// Zero share units.
    pub const ZERO: Self = Self(0);

    /// Exactly one whole share unit.
    pub const ONE: Self = Self(SCALE);

    /// Create from a raw (already scaled) value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from a whole number of units.
    pub fn from_whole(whole: u64) -> Self {
        // u64::MAX * SCALE < u128::MAX
        Self(u128::from(whole) * SCALE)
    }

    /// The raw scaled value.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// The integer part (truncating).
    pub const fn whole(&self) -> u128 {
        self.0 / SCALE
    }

    /// The fractional part, in raw units.
    pub const fn fraction(&self) -> u128 {
        self.0 % SCALE
    }

    pub fn checked_add(self, rhs: Self, ctx: &'static str) -> Result<Self, AccountingError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(AccountingError::Overflow(ctx))
    }

    pub fn checked_sub(self, rhs: Self, ctx: &'static str) -> Result<Self, AccountingError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(AccountingError::Overflow(ctx))
    }

    /// Multiply by an unscaled integer (e.g. an elapsed tick count).
    pub fn checked_mul_int(self, rhs: u64, ctx: &'static str) -> Result<Self, AccountingError> {
        self.0
            .checked_mul(u128::from(rhs))
            .map(Self)
            .ok_or(AccountingError::Overflow(ctx))
    }

    /// Compute `self / rhs` as a fixed-point ratio.
    ///
    /// Returns `None` when `rhs` is zero.
    pub fn checked_ratio(self, rhs: Self, ctx: &'static str) -> Result<Option<Self>, AccountingError> {
        if rhs.0 == 0 {
            return Ok(None);
        }
        let scaled = self
            .0
            .checked_mul(SCALE)
            .ok_or(AccountingError::Overflow(ctx))?;
        Ok(Some(Self(scaled / rhs.0)))
    }

    /// Apply this value as a ratio to an integer amount: `amount * self / SCALE`.
    pub fn apply_to(self, amount: u128, ctx: &'static str) -> Result<u128, AccountingError> {
        amount
            .checked_mul(self.0)
            .map(|v| v / SCALE)
            .ok_or(AccountingError::Overflow(ctx))
    }
}

impl fmt::Debug for ShareUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShareUnits({})", self)
    }
}

impl fmt::Display for ShareUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:07}", self.whole(), self.fraction())
    }
}
