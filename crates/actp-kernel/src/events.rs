//! Ledger events and the event bus.
//!
//! Events are appended to the snapshot inside the same atomic update as the
//! change that caused them, so the log order is the order changes were
//! applied. The [`EventBus`] fans committed events out to observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use actp_core::{Address, Amount, BasisPoints};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::ids::{EscrowId, EventId, TxId};
use crate::state::TransactionState;
use crate::store::{LedgerStore, Snapshot, SubscriptionId};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all_fields = "camelCase")]
pub enum EventPayload {
    /// A transaction was created.
    TransactionCreated {
        /// New transaction.
        tx_id: TxId,
        /// Paying party.
        requester: Address,
        /// Delivering party.
        provider: Address,
        /// Agreed amount.
        amount: Amount,
    },
    /// Funds were locked in escrow for a transaction.
    EscrowLinked {
        /// The transaction.
        tx_id: TxId,
        /// The new escrow.
        escrow_id: EscrowId,
        /// Amount locked.
        amount: Amount,
    },
    /// A transaction changed state.
    StateTransitioned {
        /// The transaction.
        tx_id: TxId,
        /// Previous state.
        from_state: TransactionState,
        /// New state.
        to_state: TransactionState,
    },
    /// Escrowed funds were paid out.
    EscrowReleased {
        /// Source escrow.
        escrow_id: EscrowId,
        /// Credited account.
        recipient: Address,
        /// Amount credited.
        amount: Amount,
    },
    /// Escrowed funds were returned to the requester.
    EscrowRefunded {
        /// Source escrow.
        escrow_id: EscrowId,
        /// Credited account.
        recipient: Address,
        /// Amount credited.
        amount: Amount,
    },
    /// Platform fee taken from an escrow payout.
    FeeCollected {
        /// Source escrow.
        escrow_id: EscrowId,
        /// Fee recipient.
        treasury: Address,
        /// Fee amount.
        amount: Amount,
    },
    /// An account was credited from outside the ledger.
    AccountFunded {
        /// Credited account.
        address: Address,
        /// Amount credited.
        amount: Amount,
    },
    /// A mediator recorded how a dispute will be split.
    ResolutionSubmitted {
        /// The disputed transaction.
        tx_id: TxId,
        /// Requester share.
        requester_amount: Amount,
        /// Provider share before fee.
        provider_amount: Amount,
        /// Mediator share.
        mediator_amount: Amount,
        /// Mediator share recipient.
        mediator: Address,
    },
    /// The platform fee for new transactions changed.
    PlatformFeeUpdated {
        /// Previous rate.
        old_bps: BasisPoints,
        /// New rate.
        new_bps: BasisPoints,
    },
}

impl EventPayload {
    /// The event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TransactionCreated { .. } => "TransactionCreated",
            Self::EscrowLinked { .. } => "EscrowLinked",
            Self::StateTransitioned { .. } => "StateTransitioned",
            Self::EscrowReleased { .. } => "EscrowReleased",
            Self::EscrowRefunded { .. } => "EscrowRefunded",
            Self::FeeCollected { .. } => "FeeCollected",
            Self::AccountFunded { .. } => "AccountFunded",
            Self::ResolutionSubmitted { .. } => "ResolutionSubmitted",
            Self::PlatformFeeUpdated { .. } => "PlatformFeeUpdated",
        }
    }

    /// The event arguments as a JSON object.
    #[must_use]
    pub fn args(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut obj)) => match obj.remove("args") {
                Some(serde_json::Value::Object(args)) => args,
                _ => serde_json::Map::new(),
            },
            _ => serde_json::Map::new(),
        }
    }

    /// The transaction this event concerns, when it names one directly.
    #[must_use]
    pub const fn tx_id(&self) -> Option<&TxId> {
        match self {
            Self::TransactionCreated { tx_id, .. }
            | Self::EscrowLinked { tx_id, .. }
            | Self::StateTransitioned { tx_id, .. }
            | Self::ResolutionSubmitted { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }
}

/// An entry in the append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id.
    pub id: EventId,
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// When the causing operation ran (Unix seconds).
    pub timestamp: i64,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// The event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.payload.name()
    }
}

/// Fan-out of committed ledger events to observers.
///
/// Publishing never blocks and needs no async runtime; slow receivers see
/// `RecvError::Lagged` rather than holding up the ledger.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    last_published: AtomicU64,
}

impl EventBus {
    /// Default channel capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a bus buffering up to `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            last_published: AtomicU64::new(0),
        })
    }

    /// Registers a new observer. It sees events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live observers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sequence of the last event published.
    #[must_use]
    pub fn last_published(&self) -> u64 {
        self.last_published.load(Ordering::SeqCst)
    }

    /// Publishes one event. Returns the number of observers reached.
    pub fn publish(&self, event: &Event) -> usize {
        let args = serde_json::Value::Object(event.payload.args());
        debug!(
            target: "actp_events",
            event_id = %event.id,
            sequence = event.sequence,
            name = event.name(),
            %args,
            "ledger event"
        );

        self.last_published.fetch_max(event.sequence, Ordering::SeqCst);
        self.sender.send(event.clone()).unwrap_or(0)
    }

    /// Publishes every event in `snapshot` newer than the last one published.
    pub fn publish_new(&self, snapshot: &Snapshot) -> usize {
        let since = self.last_published();
        snapshot
            .events_since(since)
            .iter()
            .map(|event| self.publish(event))
            .sum()
    }

    /// Forwards every event committed to `store` from now on.
    pub fn attach(self: &Arc<Self>, store: &LedgerStore) -> SubscriptionId {
        let current = store.get_state();
        self.last_published
            .fetch_max(current.sequence, Ordering::SeqCst);

        let bus = Arc::clone(self);
        store.subscribe(move |snapshot| {
            bus.publish_new(snapshot);
        })
    }
}
