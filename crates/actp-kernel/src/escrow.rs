//! Escrow custody and disbursement.
//!
//! The [`EscrowService`] is bookkeeping only: it knows how much an escrow
//! holds and who funded it, never *why* money moves. The transaction engine
//! decides that and calls in here.
//!
//! Invariants held on every call:
//! - `released` never decreases
//! - `released <= amount`
//! - `locked == false` exactly when `released == amount`

use actp_core::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::events::EventPayload;
use crate::ids::{self, EscrowId, TxId};
use crate::store::Snapshot;

/// Funds held against one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escrow {
    /// Unique escrow id.
    pub id: EscrowId,
    /// The transaction this escrow backs.
    pub tx_id: TxId,
    /// Account the funds came from; refunds go back here.
    pub depositor: Address,
    /// Amount originally locked.
    pub amount: Amount,
    /// Cumulative amount paid out or refunded.
    pub released: Amount,
    /// True while any funds remain.
    pub locked: bool,
    /// When the funds were locked.
    pub created_at: i64,
}

impl Escrow {
    /// Funds still held: `amount - released`.
    #[must_use]
    pub const fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.released)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disbursement {
    Payout,
    Fee,
    Refund,
}

/// Escrow operations over a snapshot being updated.
///
/// Borrow one inside [`crate::LedgerStore::update`]; every change it makes
/// commits or rolls back with the rest of the update.
#[derive(Debug)]
pub struct EscrowService<'a> {
    snapshot: &'a mut Snapshot,
    timestamp: i64,
}

impl<'a> EscrowService<'a> {
    /// Wraps a snapshot; `timestamp` stamps any events emitted.
    pub fn new(snapshot: &'a mut Snapshot, timestamp: i64) -> Self {
        Self {
            snapshot,
            timestamp,
        }
    }

    /// Moves `amount` from `from` into a new escrow for `tx_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if `from` cannot cover it;
    /// nothing is debited in that case.
    pub fn lock(&mut self, tx_id: &TxId, amount: Amount, from: &Address) -> Result<EscrowId> {
        if amount.is_zero() {
            return Err(LedgerError::validation("amount", "cannot escrow zero"));
        }

        let id = ids::escrow_id(tx_id, self.snapshot.sequence);
        if self.snapshot.escrows.contains_key(&id) {
            return Err(LedgerError::validation("tx_id", "escrow already exists"));
        }

        self.snapshot.debit(from, amount)?;
        self.snapshot.escrows.insert(
            id.clone(),
            Escrow {
                id: id.clone(),
                tx_id: tx_id.clone(),
                depositor: from.clone(),
                amount,
                released: Amount::ZERO,
                locked: true,
                created_at: self.timestamp,
            },
        );

        Ok(id)
    }

    /// Funds still held by an escrow.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown escrow.
    pub fn remaining(&self, escrow_id: &EscrowId) -> Result<Amount> {
        Ok(self.snapshot.escrow(escrow_id)?.remaining())
    }

    /// Pays `amount` out of escrow to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::EscrowInsufficientBalance`] if `amount` exceeds
    /// what remains.
    pub fn payout(&mut self, escrow_id: &EscrowId, recipient: &Address, amount: Amount) -> Result<()> {
        self.disburse(escrow_id, recipient, amount, Disbursement::Payout)
    }

    /// Pays a platform fee out of escrow to the treasury.
    ///
    /// # Errors
    ///
    /// Same as [`EscrowService::payout`].
    pub fn collect_fee(&mut self, escrow_id: &EscrowId, treasury: &Address, amount: Amount) -> Result<()> {
        self.disburse(escrow_id, treasury, amount, Disbursement::Fee)
    }

    /// Returns `amount` to the account that funded the escrow.
    ///
    /// # Errors
    ///
    /// Same as [`EscrowService::payout`].
    pub fn refund(&mut self, escrow_id: &EscrowId, amount: Amount) -> Result<()> {
        let depositor = self.snapshot.escrow(escrow_id)?.depositor.clone();
        self.disburse(escrow_id, &depositor, amount, Disbursement::Refund)
    }

    fn disburse(
        &mut self,
        escrow_id: &EscrowId,
        recipient: &Address,
        amount: Amount,
        kind: Disbursement,
    ) -> Result<()> {
        let escrow = self.snapshot.escrow_mut(escrow_id)?;
        let remaining = escrow.remaining();
        if amount > remaining {
            return Err(LedgerError::EscrowInsufficientBalance {
                escrow_id: escrow_id.clone(),
                requested: amount,
                remaining,
            });
        }
        if amount.is_zero() {
            return Ok(());
        }

        escrow.released = escrow
            .released
            .checked_add(amount)
            .ok_or_else(|| LedgerError::validation("amount", "escrow release overflow"))?;
        if escrow.released == escrow.amount {
            escrow.locked = false;
        }

        self.snapshot.credit(recipient, amount)?;

        let escrow_id = escrow_id.clone();
        let recipient = recipient.clone();
        let payload = match kind {
            Disbursement::Payout => EventPayload::EscrowReleased {
                escrow_id,
                recipient,
                amount,
            },
            Disbursement::Fee => EventPayload::FeeCollected {
                escrow_id,
                treasury: recipient,
                amount,
            },
            Disbursement::Refund => EventPayload::EscrowRefunded {
                escrow_id,
                recipient,
                amount,
            },
        };
        self.snapshot.emit(self.timestamp, payload);

        Ok(())
    }
}
