//! # actp-kernel
//!
//! Settlement kernel for the ACTP agent-to-agent payment protocol.
//!
//! This crate provides:
//!
//! - [`LedgerStore`]: single-writer snapshot store with atomic updates and subscribers
//! - [`EscrowService`]: custody and disbursement bookkeeping
//! - [`TransactionState`]: the 8-state lifecycle and its transition table
//! - [`TransactionEngine`]: validates transitions, enforces actor permissions,
//!   and drives escrow side effects
//! - [`EventBus`]: fan-out of the append-only event log
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use actp_core::{Address, Amount, ProtocolConfig};
//! use actp_kernel::{ManualClock, NewTransaction, TransactionEngine, TransactionState};
//!
//! # fn main() -> actp_kernel::Result<()> {
//! let clock = Arc::new(ManualClock::new(1_700_000_000));
//! let engine = TransactionEngine::in_memory(ProtocolConfig::default(), clock.clone())?;
//!
//! let requester = Address::named("requester");
//! let provider = Address::named("provider");
//! engine.fund_account(&requester, Amount::from_units(100))?;
//!
//! let tx_id = engine.create_transaction(NewTransaction::new(
//!     requester.clone(),
//!     provider.clone(),
//!     Amount::from_units(100),
//!     1_700_086_400,
//! ))?;
//! engine.link_escrow(&requester, &tx_id)?;
//! engine.transition_state(&provider, &tx_id, TransactionState::InProgress, None)?;
//! engine.transition_state(&provider, &tx_id, TransactionState::Delivered, None)?;
//! engine.transition_state(&requester, &tx_id, TransactionState::Settled, None)?;
//!
//! assert_eq!(engine.balance_of(&provider), Amount::from_units(99));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod events;
pub mod ids;
pub mod persist;
pub mod state;
pub mod store;
pub mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::TransactionEngine;
pub use error::{ErrorKind, LedgerError, Result};
pub use escrow::{Escrow, EscrowService};
pub use events::{Event, EventBus, EventPayload};
pub use ids::{EscrowId, EventId, TxId};
pub use persist::{JsonFileSink, MemorySink, NoopSink, SnapshotSink};
pub use state::TransactionState;
pub use store::{Account, LedgerStore, Snapshot, SubscriptionId, SNAPSHOT_VERSION};
pub use transaction::{NewTransaction, ResolutionDistribution, Transaction};
