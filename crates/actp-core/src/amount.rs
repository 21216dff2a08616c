//! Stablecoin amount type with fixed-point precision.
//!
//! The Amount type represents settlement currency with 6 decimal places of
//! precision. All arithmetic is integer-only and overflow-checked.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

/// Number of decimal places for settlement precision.
pub const DECIMALS: u32 = 6;

/// One whole unit in micro units.
pub const MICROS_PER_UNIT: u64 = 1_000_000;

/// Represents a currency amount with fixed-point precision (6 decimals).
///
/// Internally stored as micro-units (10^-6) to avoid floating-point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    /// Zero amount constant.
    pub const ZERO: Self = Self(0);

    /// Maximum representable amount.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an Amount from micro-units.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates an Amount from whole units.
    ///
    /// Saturates at [`Amount::MAX`].
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(MICROS_PER_UNIT))
    }

    /// Creates an Amount from whole units and hundredths, e.g. `from_cents(99, 50)` is 99.50.
    #[must_use]
    pub const fn from_cents(units: u64, cents: u64) -> Self {
        Self(
            units
                .saturating_mul(MICROS_PER_UNIT)
                .saturating_add(cents.saturating_mul(MICROS_PER_UNIT / 100)),
        )
    }

    /// Returns the amount in micro-units.
    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Returns the amount in whole units (truncates fractional part).
    #[must_use]
    pub const fn as_units(self) -> u64 {
        self.0 / MICROS_PER_UNIT
    }

    /// Checked addition. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` on underflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Checked multiplication by a scalar. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_mul(self, rhs: u64) -> Option<Self> {
        match self.0.checked_mul(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns true if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Sums an iterator of amounts, returning `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, next| acc.checked_add(next))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MICROS_PER_UNIT;
        let frac = self.0 % MICROS_PER_UNIT;
        write!(f, "{whole}.{frac:06} USDC")
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(CoreError::InvalidAmount("negative values not allowed".into()));
        }

        let (whole_str, frac_str) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole_str.is_empty() && frac_str.is_empty() {
            return Err(CoreError::InvalidAmount(format!("invalid number: {s}")));
        }
        if frac_str.len() > DECIMALS as usize {
            return Err(CoreError::InvalidAmount("too many decimal places".into()));
        }
        if !frac_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(format!("invalid fractional part: {s}")));
        }

        let whole: u64 = if whole_str.is_empty() {
            0
        } else {
            whole_str
                .parse()
                .map_err(|_| CoreError::InvalidAmount(format!("invalid whole part: {s}")))?
        };

        let frac: u64 = if frac_str.is_empty() {
            0
        } else {
            format!("{frac_str:0<6}")
                .parse()
                .map_err(|_| CoreError::InvalidAmount(format!("invalid fractional part: {s}")))?
        };

        whole
            .checked_mul(MICROS_PER_UNIT)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(|| CoreError::InvalidAmount("overflow".into()))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let whole = self.0 / MICROS_PER_UNIT;
        let frac = self.0 % MICROS_PER_UNIT;

        let s = if frac == 0 {
            format!("{whole}")
        } else {
            let frac_str = format!("{frac:06}");
            let trimmed = frac_str.trim_end_matches('0');
            format!("{whole}.{trimmed}")
        };

        serializer.serialize_str(&s)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
