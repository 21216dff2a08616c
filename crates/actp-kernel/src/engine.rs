//! Transaction engine.
//!
//! Drives transactions through the lifecycle in [`TransactionState`],
//! checking each request in a fixed order:
//!
//! 1. the edge exists in the transition table,
//! 2. the actor may take it,
//! 3. the clock allows it.
//!
//! Every operation runs as a single [`LedgerStore::update`], so the state
//! change, the escrow movements and the events it causes commit together or
//! not at all.

use std::sync::Arc;

use actp_core::{Address, Amount, BasisPoints, FeeSplit, ProtocolConfig};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ErrorKind, LedgerError, Result};
use crate::escrow::{Escrow, EscrowService};
use crate::events::{Event, EventPayload};
use crate::ids::{self, EscrowId, TxId};
use crate::state::TransactionState;
use crate::store::{LedgerStore, Snapshot};
use crate::transaction::{NewTransaction, ResolutionDistribution, Transaction};

/// Settlement engine over a [`LedgerStore`].
#[derive(Debug)]
pub struct TransactionEngine {
    store: Arc<LedgerStore>,
    clock: Arc<dyn Clock>,
    config: ProtocolConfig,
}

impl TransactionEngine {
    /// Creates an engine over an existing store.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: ProtocolConfig, store: Arc<LedgerStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    /// Creates an engine over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn in_memory(config: ProtocolConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(config, Arc::new(LedgerStore::in_memory()), clock)
    }

    /// The protocol configuration.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Current time according to the engine's clock.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Platform fee new transactions lock in.
    #[must_use]
    pub fn platform_fee(&self) -> BasisPoints {
        self.store
            .get_state()
            .platform_fee_bps
            .unwrap_or(self.config.platform_fee_bps)
    }

    // ------------------------------------------------------------------
    // Accounts and administration
    // ------------------------------------------------------------------

    /// Credits `address` from outside the ledger.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero amount or a balance overflow.
    pub fn fund_account(&self, address: &Address, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::validation("amount", "funding amount must be positive"));
        }

        let now = self.clock.now();
        self.store.update(|snap| {
            snap.credit(address, amount)?;
            snap.emit(
                now,
                EventPayload::AccountFunded {
                    address: address.clone(),
                    amount,
                },
            );
            Ok(())
        })?;

        info!(address = %address, amount = %amount, "account funded");
        Ok(())
    }

    /// Changes the platform fee applied to transactions created from now on.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] unless `actor` is the mediator,
    /// and a validation error if `bps` exceeds the configured ceiling.
    pub fn set_platform_fee(&self, actor: &Address, bps: BasisPoints) -> Result<()> {
        let now = self.clock.now();
        let old = self
            .store
            .update(|snap| {
                if *actor != self.config.mediator {
                    return Err(LedgerError::unauthorized(actor, "set the platform fee"));
                }
                if bps > self.config.max_platform_fee_bps {
                    return Err(LedgerError::validation(
                        "platform_fee_bps",
                        format!("{bps} exceeds maximum {}", self.config.max_platform_fee_bps),
                    ));
                }

                let old = snap.platform_fee_bps.unwrap_or(self.config.platform_fee_bps);
                snap.platform_fee_bps = Some(bps);
                snap.emit(
                    now,
                    EventPayload::PlatformFeeUpdated {
                        old_bps: old,
                        new_bps: bps,
                    },
                );
                Ok(old)
            })
            .inspect_err(|e| log_rejection("set_platform_fee", e))?;

        info!(old_bps = %old, new_bps = %bps, "platform fee updated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Creates a transaction in `INITIATED`, locking in the current platform fee.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the parties coincide, the amount, deadline
    /// or dispute window is out of bounds.
    pub fn create_transaction(&self, request: NewTransaction) -> Result<TxId> {
        let now = self.clock.now();
        let window = request
            .dispute_window_seconds
            .unwrap_or(self.config.default_dispute_window_secs);
        self.validate_new(&request, window, now)?;

        let tx_id = self.store.update(|snap| {
            let fee_rate = snap.platform_fee_bps.unwrap_or(self.config.platform_fee_bps);
            let tx_id = ids::transaction_id(
                &request.requester,
                &request.provider,
                request.amount,
                now,
                snap.sequence,
            );
            if snap.transactions.contains_key(&tx_id) {
                return Err(LedgerError::validation("tx_id", "transaction already exists"));
            }

            snap.transactions.insert(
                tx_id.clone(),
                Transaction {
                    id: tx_id.clone(),
                    state: TransactionState::Initiated,
                    requester: request.requester.clone(),
                    provider: request.provider.clone(),
                    amount: request.amount,
                    fee_rate_locked_bps: fee_rate,
                    deadline: request.deadline,
                    dispute_window_seconds: window,
                    delivered_at: None,
                    created_at: now,
                    updated_at: now,
                    escrow_id: None,
                    metadata: request.metadata.clone(),
                    delivery_proof: None,
                    resolution: None,
                },
            );
            snap.emit(
                now,
                EventPayload::TransactionCreated {
                    tx_id: tx_id.clone(),
                    requester: request.requester.clone(),
                    provider: request.provider.clone(),
                    amount: request.amount,
                },
            );
            Ok(tx_id)
        })?;

        info!(
            tx_id = %tx_id,
            requester = %request.requester,
            provider = %request.provider,
            amount = %request.amount,
            deadline = request.deadline,
            "transaction created"
        );
        Ok(tx_id)
    }

    fn validate_new(&self, request: &NewTransaction, window: u32, now: i64) -> Result<()> {
        if request.requester == request.provider {
            return Err(LedgerError::validation(
                "provider",
                "requester and provider must differ",
            ));
        }
        if request.requester == self.config.mediator || request.provider == self.config.mediator {
            return Err(LedgerError::validation(
                "provider",
                "the mediator cannot be a transaction party",
            ));
        }
        if request.amount < self.config.min_amount {
            return Err(LedgerError::validation(
                "amount",
                format!("{} is below the minimum {}", request.amount, self.config.min_amount),
            ));
        }
        if request.amount > self.config.max_amount {
            return Err(LedgerError::validation(
                "amount",
                format!("{} exceeds the maximum {}", request.amount, self.config.max_amount),
            ));
        }
        if request.deadline <= now {
            return Err(LedgerError::validation("deadline", "must be in the future"));
        }
        let horizon = i64::try_from(self.config.max_deadline_horizon_secs).unwrap_or(i64::MAX);
        if request.deadline > now.saturating_add(horizon) {
            return Err(LedgerError::validation(
                "deadline",
                format!("more than {horizon}s in the future"),
            ));
        }
        if !(self.config.min_dispute_window_secs..=self.config.max_dispute_window_secs).contains(&window) {
            return Err(LedgerError::validation(
                "dispute_window_seconds",
                format!(
                    "{window} outside [{}, {}]",
                    self.config.min_dispute_window_secs, self.config.max_dispute_window_secs
                ),
            ));
        }
        Ok(())
    }

    /// Locks the transaction amount in escrow and commits the transaction.
    ///
    /// This is the only way into `COMMITTED`: once funds are locked the
    /// requester can no longer walk away freely.
    ///
    /// # Errors
    ///
    /// Fails unless the transaction is `INITIATED` or `QUOTED`, `actor` is the
    /// requester, the deadline has not passed and the requester can cover the
    /// amount.
    pub fn link_escrow(&self, actor: &Address, tx_id: &TxId) -> Result<EscrowId> {
        let now = self.clock.now();
        let escrow_id = self
            .store
            .update(|snap| {
                let tx = snap.transaction(tx_id)?.clone();
                let target = TransactionState::Committed;
                if !tx.state.can_transition_to(target) {
                    return Err(invalid_transition(tx.state, target));
                }
                if *actor != tx.requester {
                    return Err(LedgerError::unauthorized(actor, "link escrow"));
                }
                ensure_before_deadline(&tx, now)?;

                let escrow_id = EscrowService::new(snap, now).lock(tx_id, tx.amount, &tx.requester)?;

                let record = snap.transaction_mut(tx_id)?;
                record.escrow_id = Some(escrow_id.clone());
                record.state = target;
                record.updated_at = now;

                snap.emit(
                    now,
                    EventPayload::EscrowLinked {
                        tx_id: tx_id.clone(),
                        escrow_id: escrow_id.clone(),
                        amount: tx.amount,
                    },
                );
                snap.emit(
                    now,
                    EventPayload::StateTransitioned {
                        tx_id: tx_id.clone(),
                        from_state: tx.state,
                        to_state: target,
                    },
                );
                Ok(escrow_id)
            })
            .inspect_err(|e| log_rejection("link_escrow", e))?;

        info!(tx_id = %tx_id, escrow_id = %escrow_id, "escrow linked, transaction committed");
        Ok(escrow_id)
    }

    /// Moves a transaction to `target`, applying that state's side effects.
    ///
    /// `proof` is stored when entering `DELIVERED` and ignored otherwise.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidStateTransition`] for an edge not in the table
    /// - [`LedgerError::Unauthorized`] if `actor` may not take the edge
    /// - a timing error if the deadline or dispute window forbids it
    /// - [`LedgerError::ResolutionRequired`] when settling a dispute without one
    pub fn transition_state(
        &self,
        actor: &Address,
        tx_id: &TxId,
        target: TransactionState,
        proof: Option<Vec<u8>>,
    ) -> Result<()> {
        let now = self.clock.now();
        let from = self
            .store
            .update(|snap| self.apply_transition(snap, actor, tx_id, target, proof, now))
            .inspect_err(|e| log_rejection("transition_state", e))?;

        info!(tx_id = %tx_id, from = %from, to = %target, actor = %actor, "transaction state changed");
        Ok(())
    }

    fn apply_transition(
        &self,
        snap: &mut Snapshot,
        actor: &Address,
        tx_id: &TxId,
        target: TransactionState,
        proof: Option<Vec<u8>>,
        now: i64,
    ) -> Result<TransactionState> {
        use TransactionState as S;

        if target == S::Committed {
            return Err(LedgerError::validation(
                "target",
                "COMMITTED is entered only by link_escrow",
            ));
        }

        let tx = snap.transaction(tx_id)?.clone();
        let from = tx.state;
        if !from.can_transition_to(target) {
            return Err(invalid_transition(from, target));
        }

        match (from, target) {
            (_, S::Quoted | S::InProgress | S::Delivered) => {
                if *actor != tx.provider {
                    return Err(LedgerError::unauthorized(actor, format!("move transaction to {target}")));
                }
                ensure_before_deadline(&tx, now)?;
            }
            (S::Delivered, S::Disputed) => {
                if *actor != tx.requester {
                    return Err(LedgerError::unauthorized(actor, "dispute the delivery"));
                }
                let closes_at = window_closes_at(&tx)?;
                if now > closes_at {
                    return Err(LedgerError::WindowClosed {
                        closed_at: closes_at,
                        now,
                    });
                }
            }
            (S::Delivered, S::Settled) => {
                if *actor == tx.provider {
                    let closes_at = window_closes_at(&tx)?;
                    if now <= closes_at {
                        return Err(LedgerError::DisputeWindowOpen { closes_at, now });
                    }
                } else if *actor != tx.requester {
                    return Err(LedgerError::unauthorized(actor, "settle the transaction"));
                }
                self.settle_to_provider(snap, &tx, now)?;
            }
            (S::Disputed, S::Settled) => {
                if *actor != self.config.mediator {
                    return Err(LedgerError::unauthorized(actor, "resolve the dispute"));
                }
                let resolution = tx
                    .resolution
                    .clone()
                    .ok_or_else(|| LedgerError::ResolutionRequired { tx_id: tx_id.clone() })?;
                self.settle_resolution(snap, &tx, &resolution, now)?;
            }
            (S::Disputed, S::Cancelled) => {
                if *actor != self.config.mediator {
                    return Err(LedgerError::unauthorized(actor, "cancel a disputed transaction"));
                }
                refund_remaining(snap, &tx, now)?;
            }
            (S::Initiated | S::Quoted, S::Cancelled) => {
                if *actor != tx.requester {
                    return Err(LedgerError::unauthorized(actor, "cancel an unfunded transaction"));
                }
            }
            (S::Committed | S::InProgress, S::Cancelled) => {
                if *actor == tx.provider {
                    refund_remaining(snap, &tx, now)?;
                } else if *actor == tx.requester {
                    if now <= tx.deadline {
                        return Err(LedgerError::DeadlineNotReached {
                            deadline: tx.deadline,
                            now,
                        });
                    }
                    self.cancel_with_penalty(snap, &tx, now)?;
                } else {
                    return Err(LedgerError::unauthorized(actor, "cancel the transaction"));
                }
            }
            _ => return Err(invalid_transition(from, target)),
        }

        let record = snap.transaction_mut(tx_id)?;
        record.state = target;
        record.updated_at = now;
        if target == S::Delivered {
            record.delivered_at = Some(now);
            record.delivery_proof = proof;
        }

        snap.emit(
            now,
            EventPayload::StateTransitioned {
                tx_id: tx_id.clone(),
                from_state: from,
                to_state: target,
            },
        );
        Ok(from)
    }

    fn settle_to_provider(&self, snap: &mut Snapshot, tx: &Transaction, now: i64) -> Result<()> {
        let escrow_id = linked_escrow(tx)?;
        let mut escrow = EscrowService::new(snap, now);
        let remaining = escrow.remaining(&escrow_id)?;
        pay_provider(
            &mut escrow,
            &escrow_id,
            &tx.provider,
            &self.config.treasury,
            remaining,
            tx.fee_rate_locked_bps,
        )
    }

    fn settle_resolution(
        &self,
        snap: &mut Snapshot,
        tx: &Transaction,
        resolution: &ResolutionDistribution,
        now: i64,
    ) -> Result<()> {
        let escrow_id = linked_escrow(tx)?;
        let mut escrow = EscrowService::new(snap, now);
        resolution.validate_against(escrow.remaining(&escrow_id)?)?;

        escrow.refund(&escrow_id, resolution.requester_amount)?;
        pay_provider(
            &mut escrow,
            &escrow_id,
            &tx.provider,
            &self.config.treasury,
            resolution.provider_amount,
            tx.fee_rate_locked_bps,
        )?;
        escrow.payout(&escrow_id, &resolution.mediator, resolution.mediator_amount)
    }

    fn cancel_with_penalty(&self, snap: &mut Snapshot, tx: &Transaction, now: i64) -> Result<()> {
        let escrow_id = linked_escrow(tx)?;
        let mut escrow = EscrowService::new(snap, now);
        let split = FeeSplit::for_cancellation(
            escrow.remaining(&escrow_id)?,
            self.config.cancellation_penalty_bps,
        );
        escrow.payout(&escrow_id, &tx.provider, split.withheld)?;
        escrow.refund(&escrow_id, split.net)
    }

    /// Releases part of the escrow to the provider while work is in progress.
    ///
    /// The locked fee rate applies to `amount`; the transaction stays
    /// `IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// Fails unless the transaction is `IN_PROGRESS` and `actor` is the
    /// requester, or with [`LedgerError::EscrowInsufficientBalance`] if
    /// `amount` exceeds what remains in escrow.
    pub fn release_milestone(&self, actor: &Address, tx_id: &TxId, amount: Amount) -> Result<()> {
        let now = self.clock.now();
        let split = self
            .store
            .update(|snap| {
                let tx = snap.transaction(tx_id)?.clone();
                if tx.state != TransactionState::InProgress {
                    return Err(LedgerError::InvalidState {
                        tx_id: tx_id.clone(),
                        state: tx.state,
                        operation: "release_milestone",
                    });
                }
                if *actor != tx.requester {
                    return Err(LedgerError::unauthorized(actor, "release a milestone"));
                }
                if amount.is_zero() {
                    return Err(LedgerError::validation("amount", "milestone must be positive"));
                }

                let escrow_id = linked_escrow(&tx)?;
                let mut escrow = EscrowService::new(snap, now);
                let remaining = escrow.remaining(&escrow_id)?;
                if amount > remaining {
                    return Err(LedgerError::EscrowInsufficientBalance {
                        escrow_id,
                        requested: amount,
                        remaining,
                    });
                }
                let split = FeeSplit::for_payout(amount, tx.fee_rate_locked_bps);
                escrow.payout(&escrow_id, &tx.provider, split.net)?;
                escrow.collect_fee(&escrow_id, &self.config.treasury, split.withheld)?;

                snap.transaction_mut(tx_id)?.updated_at = now;
                Ok(split)
            })
            .inspect_err(|e| log_rejection("release_milestone", e))?;

        info!(tx_id = %tx_id, gross = %split.gross, fee = %split.withheld, net = %split.net, "milestone released");
        Ok(())
    }

    /// Records how the mediator will split a disputed transaction's escrow.
    ///
    /// A later submission replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Fails unless the transaction is `DISPUTED`, `actor` is the mediator and
    /// the shares add up to the remaining escrow exactly.
    pub fn submit_resolution(
        &self,
        actor: &Address,
        tx_id: &TxId,
        distribution: ResolutionDistribution,
    ) -> Result<()> {
        let now = self.clock.now();
        self.store
            .update(|snap| {
                let tx = snap.transaction(tx_id)?.clone();
                if tx.state != TransactionState::Disputed {
                    return Err(LedgerError::InvalidState {
                        tx_id: tx_id.clone(),
                        state: tx.state,
                        operation: "submit_resolution",
                    });
                }
                if *actor != self.config.mediator {
                    return Err(LedgerError::unauthorized(actor, "submit a resolution"));
                }

                let escrow_id = linked_escrow(&tx)?;
                distribution.validate_against(snap.escrow(&escrow_id)?.remaining())?;

                let record = snap.transaction_mut(tx_id)?;
                record.resolution = Some(distribution.clone());
                record.updated_at = now;

                snap.emit(
                    now,
                    EventPayload::ResolutionSubmitted {
                        tx_id: tx_id.clone(),
                        requester_amount: distribution.requester_amount,
                        provider_amount: distribution.provider_amount,
                        mediator_amount: distribution.mediator_amount,
                        mediator: distribution.mediator.clone(),
                    },
                );
                Ok(())
            })
            .inspect_err(|e| log_rejection("submit_resolution", e))?;

        info!(tx_id = %tx_id, "dispute resolution submitted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current ledger snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.get_state()
    }

    /// Looks up a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown id.
    pub fn transaction(&self, tx_id: &TxId) -> Result<Transaction> {
        self.store.get_state().transaction(tx_id).cloned()
    }

    /// Looks up an escrow.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown id.
    pub fn escrow(&self, escrow_id: &EscrowId) -> Result<Escrow> {
        self.store.get_state().escrow(escrow_id).cloned()
    }

    /// Balance of an account.
    #[must_use]
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.store.get_state().balance_of(address)
    }

    /// The full event log.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.store.get_state().events.clone()
    }

    /// Events appended after `sequence`.
    #[must_use]
    pub fn events_since(&self, sequence: u64) -> Vec<Event> {
        self.store.get_state().events_since(sequence).to_vec()
    }
}

fn invalid_transition(from: TransactionState, to: TransactionState) -> LedgerError {
    LedgerError::InvalidStateTransition {
        from,
        to,
        valid_targets: from.valid_targets().to_vec(),
    }
}

fn ensure_before_deadline(tx: &Transaction, now: i64) -> Result<()> {
    if now > tx.deadline {
        return Err(LedgerError::DeadlineExpired {
            deadline: tx.deadline,
            now,
        });
    }
    Ok(())
}

fn window_closes_at(tx: &Transaction) -> Result<i64> {
    tx.dispute_window_closes_at()
        .ok_or_else(|| LedgerError::validation("delivered_at", "transaction has no delivery time"))
}

fn linked_escrow(tx: &Transaction) -> Result<EscrowId> {
    tx.escrow_id.clone().ok_or_else(|| LedgerError::NotFound {
        entity: "escrow",
        id: format!("for transaction {}", tx.id),
    })
}

fn pay_provider(
    escrow: &mut EscrowService<'_>,
    escrow_id: &EscrowId,
    provider: &Address,
    treasury: &Address,
    gross: Amount,
    rate: BasisPoints,
) -> Result<()> {
    let split = FeeSplit::for_payout(gross, rate);
    escrow.payout(escrow_id, provider, split.net)?;
    escrow.collect_fee(escrow_id, treasury, split.withheld)
}

fn refund_remaining(snap: &mut Snapshot, tx: &Transaction, now: i64) -> Result<()> {
    let escrow_id = linked_escrow(tx)?;
    let mut escrow = EscrowService::new(snap, now);
    let remaining = escrow.remaining(&escrow_id)?;
    escrow.refund(&escrow_id, remaining)
}

fn log_rejection(operation: &'static str, err: &LedgerError) {
    match err.kind() {
        ErrorKind::Unauthorized | ErrorKind::InvalidStateTransition => {
            warn!(operation, kind = %err.kind(), error = %err, "rejected ledger operation");
        }
        kind => debug!(operation, kind = %kind, error = %err, "ledger operation failed"),
    }
}
