//! Ledger store.
//!
//! The [`LedgerStore`] owns the single authoritative [`Snapshot`] of accounts,
//! transactions, escrows and events. Every mutation goes through
//! [`LedgerStore::update`], which:
//!
//! 1. serializes writers,
//! 2. applies the updater to a private copy of the snapshot,
//! 3. persists the copy through the configured [`SnapshotSink`],
//! 4. publishes it as the new state, and
//! 5. notifies subscribers synchronously, in commit order.
//!
//! If the updater fails or persistence fails, nothing is published and no
//! subscriber runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use actp_core::{Address, Amount, BasisPoints};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::escrow::Escrow;
use crate::events::{Event, EventPayload};
use crate::ids::{self, EscrowId, TxId};
use crate::persist::{NoopSink, SnapshotSink};
use crate::transaction::Transaction;

/// Version tag written into every persisted snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A participant balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owner address.
    pub address: Address,
    /// Spendable balance.
    pub balance: Amount,
}

/// Complete ledger state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layout version.
    pub version: u32,
    /// Number of events appended so far; also a nonce for id derivation.
    pub sequence: u64,
    /// Platform fee override set by an administrator, if any.
    pub platform_fee_bps: Option<BasisPoints>,
    /// Accounts by address.
    pub accounts: BTreeMap<Address, Account>,
    /// Transactions by id.
    pub transactions: BTreeMap<TxId, Transaction>,
    /// Escrows by id.
    pub escrows: BTreeMap<EscrowId, Escrow>,
    /// Append-only event log.
    pub events: Vec<Event>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            sequence: 0,
            platform_fee_bps: None,
            accounts: BTreeMap::new(),
            transactions: BTreeMap::new(),
            escrows: BTreeMap::new(),
            events: Vec::new(),
        }
    }
}

impl Snapshot {
    /// Balance of an account; zero if it was never credited.
    #[must_use]
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.accounts
            .get(address)
            .map_or(Amount::ZERO, |account| account.balance)
    }

    /// Credits an account, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the balance would overflow.
    pub fn credit(&mut self, address: &Address, amount: Amount) -> Result<()> {
        let account = self
            .accounts
            .entry(address.clone())
            .or_insert_with(|| Account {
                address: address.clone(),
                balance: Amount::ZERO,
            });

        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::validation("amount", "account balance overflow"))?;
        Ok(())
    }

    /// Debits an account. Never partially debits.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] if the balance is too low.
    pub fn debit(&mut self, address: &Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(address);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: address.clone(),
                required: amount,
                available,
            })?;

        if let Some(account) = self.accounts.get_mut(address) {
            account.balance = remaining;
        }
        Ok(())
    }

    /// Looks up a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown id.
    pub fn transaction(&self, id: &TxId) -> Result<&Transaction> {
        self.transactions
            .get(id)
            .ok_or_else(|| LedgerError::transaction_not_found(id))
    }

    /// Looks up a transaction for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown id.
    pub fn transaction_mut(&mut self, id: &TxId) -> Result<&mut Transaction> {
        self.transactions
            .get_mut(id)
            .ok_or_else(|| LedgerError::transaction_not_found(id))
    }

    /// Looks up an escrow.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown id.
    pub fn escrow(&self, id: &EscrowId) -> Result<&Escrow> {
        self.escrows
            .get(id)
            .ok_or_else(|| LedgerError::escrow_not_found(id))
    }

    /// Looks up an escrow for mutation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown id.
    pub fn escrow_mut(&mut self, id: &EscrowId) -> Result<&mut Escrow> {
        self.escrows
            .get_mut(id)
            .ok_or_else(|| LedgerError::escrow_not_found(id))
    }

    /// Appends an event, assigning it the next sequence number.
    pub fn emit(&mut self, timestamp: i64, payload: EventPayload) -> &Event {
        self.sequence += 1;
        let event = Event {
            id: ids::event_id(self.sequence, payload.name(), timestamp),
            sequence: self.sequence,
            timestamp,
            payload,
        };
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    /// Events with a sequence greater than `sequence`.
    #[must_use]
    pub fn events_since(&self, sequence: u64) -> &[Event] {
        let start = self.events.partition_point(|e| e.sequence <= sequence);
        &self.events[start..]
    }

    /// Total funds still held across all locked escrows.
    #[must_use]
    pub fn escrowed_total(&self) -> Amount {
        self.escrows
            .values()
            .filter(|escrow| escrow.locked)
            .fold(Amount::ZERO, |acc, escrow| {
                acc.checked_add(escrow.remaining()).unwrap_or(Amount::MAX)
            })
    }
}

/// Handle returned by [`LedgerStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Single-writer store for the ledger snapshot.
///
/// Listeners run synchronously on the writer's thread after each commit and
/// must not call [`LedgerStore::update`] themselves.
///
/// Each update clones the whole snapshot, event log included, and the sink
/// sees the whole snapshot too. A long-running ledger pays for that on every
/// commit, so this store suits simulations and small deployments.
pub struct LedgerStore {
    state: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    sink: Box<dyn SnapshotSink>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerStore")
            .field("sequence", &self.state.read().sequence)
            .field("sink", &self.sink)
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

impl LedgerStore {
    /// Creates an empty store that keeps nothing beyond memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_sink(Box::new(NoopSink))
    }

    /// Creates an empty store persisting every commit to `sink`.
    #[must_use]
    pub fn with_sink(sink: Box<dyn SnapshotSink>) -> Self {
        Self::from_parts(Snapshot::default(), sink)
    }

    /// Opens a store from `sink`, restoring the last persisted snapshot if
    /// there is one.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if the sink cannot be read or the
    /// snapshot version is not [`SNAPSHOT_VERSION`].
    pub fn open(sink: Box<dyn SnapshotSink>) -> Result<Self> {
        let snapshot = match sink.load()? {
            Some(snapshot) if snapshot.version != SNAPSHOT_VERSION => {
                return Err(LedgerError::Persistence(format!(
                    "snapshot version {} not supported (expected {SNAPSHOT_VERSION})",
                    snapshot.version
                )));
            }
            Some(snapshot) => {
                debug!(sequence = snapshot.sequence, "restored ledger snapshot");
                snapshot
            }
            None => Snapshot::default(),
        };

        Ok(Self::from_parts(snapshot, sink))
    }

    fn from_parts(snapshot: Snapshot, sink: Box<dyn SnapshotSink>) -> Self {
        Self {
            state: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            sink,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Returns the current snapshot. It never reflects a partial update.
    #[must_use]
    pub fn get_state(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read())
    }

    /// Applies `f` to a copy of the current snapshot and commits the result.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or [`LedgerError::Persistence`] if the
    /// sink rejects the new snapshot. In both cases nothing is committed.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Snapshot) -> Result<T>,
    {
        let _writer = self.writer.lock();

        let mut next = Snapshot::clone(&self.state.read());
        let value = f(&mut next)?;

        self.sink.persist(&next)?;

        let committed = Arc::new(next);
        *self.state.write() = Arc::clone(&committed);

        debug!(sequence = committed.sequence, "committed ledger update");

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&committed);
        }

        Ok(value)
    }

    /// Registers a listener called after every successful update.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
