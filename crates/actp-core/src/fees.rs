//! Platform fee and cancellation penalty arithmetic.
//!
//! # Precision Guarantees
//!
//! - **No floating-point**: integer arithmetic only
//! - **No overflow**: intermediates use `u128`; a rate of at most 10000 bps
//!   can never produce a result larger than the input amount
//! - **Truncating rounding**: `floor(amount × bps / 10000)`, so the fee or
//!   penalty taken is never more than the exact share and the recipient of
//!   the remainder never loses a micro-unit to rounding
//!
//! Fees apply to provider-bound payouts only (full settlement, milestones and
//! the provider share of a dispute resolution). Refunds and mediator shares
//! never carry a fee. Penalties apply only to requester-initiated cancellations
//! after the deadline and are paid to the provider.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Amount, CoreError};

/// Basis-point denominator (100% = 10000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// A rate expressed in basis points, guaranteed to be within `0..=10000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct BasisPoints(u16);

impl BasisPoints {
    /// Zero rate.
    pub const ZERO: Self = Self(0);

    /// Creates a rate, rejecting values above 10000.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRate`] if `bps > 10000`.
    pub fn new(bps: u16) -> Result<Self, CoreError> {
        if u32::from(bps) > BPS_DENOMINATOR {
            return Err(CoreError::InvalidRate(u32::from(bps)));
        }
        Ok(Self(bps))
    }

    /// Returns the raw basis-point value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Applies this rate to an amount, truncating.
    #[must_use]
    pub const fn apply(self, amount: Amount) -> Amount {
        let scaled = amount.as_micros() as u128 * self.0 as u128 / BPS_DENOMINATOR as u128;
        Amount::from_micros(scaled as u64)
    }
}

impl TryFrom<u16> for BasisPoints {
    type Error = CoreError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u16 {
    fn from(value: BasisPoints) -> Self {
        value.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bps", self.0)
    }
}

/// Platform fee on a provider-bound payout: `floor(amount × rate / 10000)`.
///
/// # Examples
/// ```
/// use actp_core::{Amount, BasisPoints};
/// use actp_core::fees::fee;
///
/// let rate = BasisPoints::new(100).unwrap();
/// assert_eq!(fee(Amount::from_units(100), rate), Amount::from_units(1));
/// ```
#[must_use]
pub const fn fee(amount: Amount, rate: BasisPoints) -> Amount {
    rate.apply(amount)
}

/// Cancellation penalty: `floor(amount × rate / 10000)`.
#[must_use]
pub const fn penalty(amount: Amount, rate: BasisPoints) -> Amount {
    rate.apply(amount)
}

/// A gross amount split into the part kept and the part withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// The amount before the split.
    pub gross: Amount,
    /// The withheld part (fee or penalty).
    pub withheld: Amount,
    /// `gross - withheld`.
    pub net: Amount,
}

impl FeeSplit {
    /// Splits `gross` into the fee and the provider's net share.
    #[must_use]
    pub const fn for_payout(gross: Amount, rate: BasisPoints) -> Self {
        let withheld = fee(gross, rate);
        Self {
            gross,
            withheld,
            net: gross.saturating_sub(withheld),
        }
    }

    /// Splits `gross` into the penalty and the requester's refund.
    #[must_use]
    pub const fn for_cancellation(gross: Amount, rate: BasisPoints) -> Self {
        let withheld = penalty(gross, rate);
        Self {
            gross,
            withheld,
            net: gross.saturating_sub(withheld),
        }
    }
}
