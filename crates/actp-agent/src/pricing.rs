//! Pricing engine.
//!
//! Turns a provider's cost model and target margin into a quoted price.
//! All money math is integer micro-units; the margin is the only float and is
//! converted to basis points before it touches an amount.

use actp_core::{Amount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Lowest price a provider will quote.
pub const MIN_PRICE: Amount = Amount::from_cents(0, 5);

/// Highest price a provider will quote.
pub const MAX_PRICE: Amount = Amount::from_units(10_000);

/// Largest margin honoured, in basis points (95%).
pub const MAX_MARGIN_BPS: u16 = 9_500;

/// What it costs a provider to serve a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostModel {
    /// Fixed cost per job.
    pub base: Amount,
    /// Cost per billable unit.
    pub per_unit_rate: Amount,
    /// Name of the billable unit, e.g. `"token"` or `"image"`.
    pub unit_type: String,
}

impl CostModel {
    /// Creates a cost model.
    #[must_use]
    pub fn new(base: Amount, per_unit_rate: Amount, unit_type: impl Into<String>) -> Self {
        Self {
            base,
            per_unit_rate,
            unit_type: unit_type.into(),
        }
    }

    /// `base + per_unit_rate * units`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Pricing`] on overflow.
    pub fn cost(&self, units: u64) -> Result<Amount> {
        self.per_unit_rate
            .checked_mul(units)
            .and_then(|variable| self.base.checked_add(variable))
            .ok_or_else(|| AgentError::Pricing(format!("cost of {units} {} overflows", self.unit_type)))
    }
}

/// A computed quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// What serving the job costs.
    pub cost: Amount,
    /// What the provider asks for.
    pub price: Amount,
    /// `price - cost` in micro-units; negative when the price ceiling bites.
    pub profit_micros: i64,
    /// Margin actually applied.
    pub margin_bps: u16,
}

impl PriceQuote {
    /// Returns true if serving at `price` loses money.
    #[must_use]
    pub const fn is_loss(&self) -> bool {
        self.profit_micros < 0
    }
}

/// Converts a margin fraction to basis points, clamped to `0..=9500`.
///
/// NaN counts as no margin.
#[must_use]
pub fn margin_bps(margin: f64) -> u16 {
    if margin.is_nan() {
        return 0;
    }
    (margin * f64::from(BPS_DENOMINATOR))
        .round()
        .clamp(0.0, f64::from(MAX_MARGIN_BPS)) as u16
}

/// Quotes a job of `units` at `margin`.
///
/// `price = cost / (1 - margin)`, rounded up to the micro-unit and clamped
/// to [`MIN_PRICE`]..=[`MAX_PRICE`].
///
/// # Errors
///
/// Returns [`AgentError::Pricing`] if the cost overflows.
///
/// # Example
///
/// ```rust
/// use actp_core::Amount;
/// use actp_agent::pricing::{calculate_price, CostModel};
///
/// let model = CostModel::new(Amount::from_units(1), Amount::from_cents(0, 1), "token");
/// let quote = calculate_price(&model, 100, 0.5).unwrap();
/// assert_eq!(quote.cost, Amount::from_units(2));
/// assert_eq!(quote.price, Amount::from_units(4));
/// ```
pub fn calculate_price(model: &CostModel, units: u64, margin: f64) -> Result<PriceQuote> {
    let cost = model.cost(units)?;
    let margin_bps = margin_bps(margin);

    let denominator = u128::from(BPS_DENOMINATOR - u32::from(margin_bps));
    let raw = (u128::from(cost.as_micros()) * u128::from(BPS_DENOMINATOR)).div_ceil(denominator);
    let price = Amount::from_micros(u64::try_from(raw).unwrap_or(u64::MAX)).clamp(MIN_PRICE, MAX_PRICE);

    let profit = i128::from(price.as_micros()) - i128::from(cost.as_micros());
    let profit_micros = i64::try_from(profit).unwrap_or(if profit < 0 { i64::MIN } else { i64::MAX });

    Ok(PriceQuote {
        cost,
        price,
        profit_micros,
        margin_bps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn flat(cost_units: u64) -> CostModel {
        CostModel::new(Amount::from_units(cost_units), Amount::ZERO, "job")
    }

    #[test]
    fn cost_adds_per_unit_charge() {
        let model = CostModel::new(Amount::from_units(2), Amount::from_cents(0, 25), "page");
        assert_eq!(model.cost(8).unwrap(), Amount::from_units(4));
    }

    #[test]
    fn cost_overflow_is_an_error() {
        let model = CostModel::new(Amount::ZERO, Amount::MAX, "page");
        assert!(matches!(model.cost(2), Err(AgentError::Pricing(_))));
    }

    #[test_case(0.0, 0 ; "zero")]
    #[test_case(0.2, 2_000 ; "twenty percent")]
    #[test_case(0.123_46, 1_235 ; "rounds")]
    #[test_case(-0.5, 0 ; "negative clamps")]
    #[test_case(0.99, 9_500 ; "above cap clamps")]
    #[test_case(f64::NAN, 0 ; "nan")]
    #[test_case(f64::INFINITY, 9_500 ; "infinity")]
    fn margin_conversion(margin: f64, expected: u16) {
        assert_eq!(margin_bps(margin), expected);
    }

    #[test]
    fn twenty_percent_margin() {
        let quote = calculate_price(&flat(8), 0, 0.2).unwrap();
        assert_eq!(quote.price, Amount::from_units(10));
        assert_eq!(quote.profit_micros, 2_000_000);
        assert!(!quote.is_loss());
    }

    #[test]
    fn price_rounds_up_to_micro_unit() {
        // 1 / 0.7 = 1.428571428...
        let quote = calculate_price(&flat(1), 0, 0.3).unwrap();
        assert_eq!(quote.price, Amount::from_micros(1_428_572));
    }

    #[test]
    fn price_floor_applies() {
        let quote = calculate_price(&flat(0), 0, 0.5).unwrap();
        assert_eq!(quote.price, MIN_PRICE);
    }

    #[test]
    fn price_ceiling_can_produce_loss() {
        let quote = calculate_price(&flat(20_000), 0, 0.1).unwrap();
        assert_eq!(quote.price, MAX_PRICE);
        assert_eq!(quote.profit_micros, -10_000_000_000);
        assert!(quote.is_loss());
    }

    #[test]
    fn quote_serializes_camel_case() {
        let quote = calculate_price(&flat(1), 0, 0.0).unwrap();
        let json = serde_json::to_value(quote).unwrap();
        assert_eq!(json["profitMicros"], 0);
        assert_eq!(json["marginBps"], 0);
    }

    proptest! {
        #[test]
        fn price_covers_cost_inside_bounds(cost in 50_000u64..=10_000_000_000, margin in 0.0f64..0.95) {
            let model = CostModel::new(Amount::from_micros(cost), Amount::ZERO, "job");
            let quote = calculate_price(&model, 0, margin).unwrap();
            prop_assert!(quote.price >= MIN_PRICE);
            prop_assert!(quote.price <= MAX_PRICE);
            prop_assert!(quote.price >= quote.cost);
            prop_assert!(!quote.is_loss());
        }

        #[test]
        fn higher_margin_never_lowers_price(cost in 0u64..1_000_000_000, a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let model = CostModel::new(Amount::from_micros(cost), Amount::ZERO, "job");
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let low = calculate_price(&model, 0, lo).unwrap();
            let high = calculate_price(&model, 0, hi).unwrap();
            prop_assert!(high.price >= low.price);
        }
    }
}
