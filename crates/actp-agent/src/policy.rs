//! Acceptance policy.
//!
//! Decides whether a provider takes a job at the requester's budget:
//! - budget outside the provider's range: reject
//! - budget below cost: reject, serving would lose money
//! - budget covers cost but not price: counter-offer at the price
//! - budget covers price: accept

use actp_core::Amount;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::pricing::{calculate_price, CostModel, PriceQuote, MAX_PRICE, MIN_PRICE};

/// How a provider prices and filters work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Cost of serving a job.
    pub cost_model: CostModel,
    /// Target margin as a fraction of price (0.2 = 20%).
    pub margin: f64,
    /// Smallest budget worth considering.
    pub min_budget: Amount,
    /// Largest budget the provider will take on.
    pub max_budget: Amount,
}

impl ProviderConfig {
    /// Creates a config that considers any budget within the price bounds.
    #[must_use]
    pub const fn new(cost_model: CostModel, margin: f64) -> Self {
        Self {
            cost_model,
            margin,
            min_budget: MIN_PRICE,
            max_budget: MAX_PRICE,
        }
    }

    /// Restricts the budgets the provider considers.
    #[must_use]
    pub fn with_budget_range(mut self, min: Amount, max: Amount) -> Self {
        self.min_budget = min;
        self.max_budget = max;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if the budget range is inverted
    /// or the margin is not a finite number.
    pub fn validate(&self) -> Result<()> {
        if self.min_budget > self.max_budget {
            return Err(AgentError::InvalidConfig(format!(
                "min_budget {} exceeds max_budget {}",
                self.min_budget, self.max_budget
            )));
        }
        if !self.margin.is_finite() {
            return Err(AgentError::InvalidConfig("margin must be finite".to_string()));
        }
        Ok(())
    }
}

/// Outcome of evaluating a job opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum JobDecision {
    /// Accept the job as-is.
    Accept,
    /// Propose a different price.
    CounterOffer {
        /// Price the provider would accept.
        proposed_price: Amount,
        /// Explanation of the counter-offer.
        reason: String,
    },
    /// Reject the job outright.
    Reject {
        /// Reason for rejection.
        reason: String,
    },
}

impl JobDecision {
    /// Creates a Reject decision with the given reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
        }
    }

    /// Creates a CounterOffer decision.
    #[must_use]
    pub fn counter_offer(proposed_price: Amount, reason: impl Into<String>) -> Self {
        Self::CounterOffer {
            proposed_price,
            reason: reason.into(),
        }
    }

    /// Returns true if this is an Accept decision.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Returns true if this is a Reject decision.
    #[must_use]
    pub const fn is_reject(&self) -> bool {
        matches!(self, Self::Reject { .. })
    }

    /// The reason attached to a non-accept decision.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accept => None,
            Self::CounterOffer { reason, .. } | Self::Reject { reason } => Some(reason),
        }
    }
}

/// A decision together with the quote behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvaluation {
    /// What the provider will do.
    pub decision: JobDecision,
    /// The provider's price for the job.
    pub quote: PriceQuote,
}

/// Evaluates a job of `units` offered at `budget`.
///
/// # Errors
///
/// Returns [`AgentError::Pricing`] if the job cost overflows.
pub fn evaluate_job(config: &ProviderConfig, budget: Amount, units: u64) -> Result<JobEvaluation> {
    let quote = calculate_price(&config.cost_model, units, config.margin)?;

    let decision = if budget < config.min_budget || budget > config.max_budget {
        JobDecision::reject(format!(
            "budget {budget} outside accepted range {}..={}",
            config.min_budget, config.max_budget
        ))
    } else if budget < quote.cost {
        JobDecision::reject(format!("budget {budget} below cost {}", quote.cost))
    } else if budget < quote.price {
        JobDecision::counter_offer(
            quote.price,
            format!("budget {budget} covers cost but not price {}", quote.price),
        )
    } else {
        JobDecision::Accept
    };

    Ok(JobEvaluation { decision, quote })
}
