//! Transaction records and request types.

use actp_core::{Address, Amount, BasisPoints};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{EscrowId, TxId};
use crate::state::TransactionState;

/// A transaction between a requester and a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction id.
    pub id: TxId,
    /// Current lifecycle state.
    pub state: TransactionState,
    /// Party paying for the service.
    pub requester: Address,
    /// Party delivering the service.
    pub provider: Address,
    /// Agreed amount.
    pub amount: Amount,
    /// Platform fee frozen at creation.
    pub fee_rate_locked_bps: BasisPoints,
    /// Work deadline (Unix seconds).
    pub deadline: i64,
    /// Seconds after delivery during which the requester may dispute.
    pub dispute_window_seconds: u32,
    /// When the provider delivered.
    pub delivered_at: Option<i64>,
    /// Creation time.
    pub created_at: i64,
    /// Last mutation time.
    pub updated_at: i64,
    /// Escrow backing this transaction, once linked.
    pub escrow_id: Option<EscrowId>,
    /// Opaque caller data; never parsed.
    pub metadata: Option<Vec<u8>>,
    /// Opaque proof supplied with delivery.
    pub delivery_proof: Option<Vec<u8>>,
    /// Mediator's distribution for a disputed transaction.
    pub resolution: Option<ResolutionDistribution>,
}

impl Transaction {
    /// When the dispute window closes, if the transaction has been delivered.
    #[must_use]
    pub fn dispute_window_closes_at(&self) -> Option<i64> {
        self.delivered_at
            .map(|at| at.saturating_add(i64::from(self.dispute_window_seconds)))
    }

    /// Returns true once the transaction can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Parameters for creating a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Party paying for the service; also the caller.
    pub requester: Address,
    /// Party delivering the service.
    pub provider: Address,
    /// Agreed amount.
    pub amount: Amount,
    /// Work deadline (Unix seconds).
    pub deadline: i64,
    /// Dispute window; the protocol default applies when `None`.
    pub dispute_window_seconds: Option<u32>,
    /// Opaque caller data.
    pub metadata: Option<Vec<u8>>,
}

impl NewTransaction {
    /// Creates a request with the default dispute window and no metadata.
    #[must_use]
    pub const fn new(requester: Address, provider: Address, amount: Amount, deadline: i64) -> Self {
        Self {
            requester,
            provider,
            amount,
            deadline,
            dispute_window_seconds: None,
            metadata: None,
        }
    }

    /// Sets the dispute window.
    #[must_use]
    pub const fn dispute_window(mut self, seconds: u32) -> Self {
        self.dispute_window_seconds = Some(seconds);
        self
    }

    /// Attaches opaque metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// How a mediator splits the remaining escrow of a disputed transaction.
///
/// The three shares must add up to exactly the remaining escrow balance.
/// Only the provider share carries the platform fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDistribution {
    /// Returned to the requester.
    pub requester_amount: Amount,
    /// Paid to the provider, before fee.
    pub provider_amount: Amount,
    /// Paid to the mediator.
    pub mediator_amount: Amount,
    /// Recipient of the mediator share.
    pub mediator: Address,
}

impl ResolutionDistribution {
    /// Sum of the three shares.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the sum overflows.
    pub fn total(&self) -> Result<Amount> {
        Amount::checked_sum([
            self.requester_amount,
            self.provider_amount,
            self.mediator_amount,
        ])
        .ok_or_else(|| LedgerError::validation("distribution", "shares overflow"))
    }

    /// Checks that the shares add up to `remaining` exactly.
    ///
    /// # Errors
    ///
    /// Returns a validation error on any other total.
    pub fn validate_against(&self, remaining: Amount) -> Result<()> {
        let total = self.total()?;
        if total != remaining {
            return Err(LedgerError::validation(
                "distribution",
                format!("shares total {total}, escrow holds {remaining}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution(r: u64, p: u64, m: u64) -> ResolutionDistribution {
        ResolutionDistribution {
            requester_amount: Amount::from_units(r),
            provider_amount: Amount::from_units(p),
            mediator_amount: Amount::from_units(m),
            mediator: Address::named("mediator"),
        }
    }

    #[test]
    fn distribution_must_match_remaining() {
        assert!(distribution(30, 60, 10).validate_against(Amount::from_units(100)).is_ok());
        assert!(distribution(30, 60, 9).validate_against(Amount::from_units(100)).is_err());
        assert!(distribution(30, 61, 10).validate_against(Amount::from_units(100)).is_err());
    }

    #[test]
    fn distribution_overflow_is_validation_error() {
        let d = ResolutionDistribution {
            requester_amount: Amount::MAX,
            provider_amount: Amount::from_micros(1),
            mediator_amount: Amount::ZERO,
            mediator: Address::named("mediator"),
        };
        assert!(d.total().is_err());
    }

    #[test]
    fn new_transaction_builder() {
        let req = NewTransaction::new(
            Address::named("a"),
            Address::named("b"),
            Amount::from_units(1),
            500,
        )
        .dispute_window(7_200)
        .metadata(b"job:translate".to_vec());

        assert_eq!(req.dispute_window_seconds, Some(7_200));
        assert_eq!(req.metadata.as_deref(), Some(&b"job:translate"[..]));
    }
}
