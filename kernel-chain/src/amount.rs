//! Monetary amounts, denominated in base units.
//!
//! There are no negative amounts anywhere in this chain's data model, so
//! `Amount` wraps a `u64` and all arithmetic is checked: an overflow or an
//! underflow is a consensus error, never a wrap.

use std::fmt;

use crate::{KernelDeserialize, KernelSerialize, SerializationError};
use thiserror::Error;

/// The number of base units in one coin.
pub const COIN: u64 = 100_000_000;

/// An amount of base units.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const fn zero() -> Amount {
        Amount(0)
    }

    pub const fn from_base_units(units: u64) -> Amount {
        Amount(units)
    }

    /// Whole coins, scaled by `COIN`. Fails on overflow.
    pub fn from_coins(coins: u64) -> Result<Amount, AmountError> {
        coins
            .checked_mul(COIN)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    pub fn base_units(&self) -> u64 {
        self.0
    }

    /// Lossy conversion for human-facing displays only.
    pub fn to_coins(&self) -> f64 {
        self.0 as f64 / COIN as f64
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(rhs.0)
            .map(Amount)
            .ok_or(AmountError::Underflow)
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn sum(amounts: impl IntoIterator<Item = Amount>) -> Result<Amount, AmountError> {
        amounts
            .into_iter()
            .try_fold(Amount::zero(), Amount::checked_add)
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmountError {
    #[error("amount overflowed a u64")]
    Overflow,
    #[error("amount went below zero")]
    Underflow,
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

impl KernelSerialize for Amount {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.kernel_serialize(writer)
    }
}

impl KernelDeserialize for Amount {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Amount(u64::kernel_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_arithmetic() {
        let a = Amount::from_base_units(u64::max_value());
        assert_eq!(
            a.checked_add(Amount::from_base_units(1)),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            Amount::zero().checked_sub(Amount::from_base_units(1)),
            Err(AmountError::Underflow)
        );
        assert_eq!(
            Amount::from_coins(50).unwrap(),
            Amount::from_base_units(5_000_000_000)
        );
    }

    #[test]
    fn display_formats_base_units_as_coins() {
        assert_eq!(
            Amount::from_base_units(5_000_000_000).to_string(),
            "50.00000000"
        );
        assert_eq!(Amount::from_base_units(1).to_string(), "0.00000001");
    }
}
