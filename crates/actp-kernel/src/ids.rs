//! Identifier generation.
//!
//! Transaction, escrow and event identifiers are blake3 digests over a
//! domain tag and the inputs that make them unique. The same inputs always
//! give the same identifier, so a replayed ledger reproduces its ids exactly.

use std::fmt;

use actp_core::{Address, Amount};
use serde::{Deserialize, Serialize};

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            fn from_hash(hash: blake3::Hash) -> Self {
                Self(format!("0x{}", hash.to_hex()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

digest_id!(
    /// Transaction identifier.
    TxId
);
digest_id!(
    /// Escrow identifier.
    EscrowId
);
digest_id!(
    /// Event identifier.
    EventId
);

/// Derives a transaction id from its parties, amount, creation time and the
/// ledger sequence at creation.
#[must_use]
pub fn transaction_id(
    requester: &Address,
    provider: &Address,
    amount: Amount,
    timestamp: i64,
    sequence: u64,
) -> TxId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"actp:tx:");
    hasher.update(requester.as_str().as_bytes());
    hasher.update(provider.as_str().as_bytes());
    hasher.update(&amount.as_micros().to_le_bytes());
    hasher.update(&timestamp.to_le_bytes());
    hasher.update(&sequence.to_le_bytes());
    TxId::from_hash(hasher.finalize())
}

/// Derives the escrow id for a transaction.
#[must_use]
pub fn escrow_id(tx_id: &TxId, sequence: u64) -> EscrowId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"actp:escrow:");
    hasher.update(tx_id.as_str().as_bytes());
    hasher.update(&sequence.to_le_bytes());
    EscrowId::from_hash(hasher.finalize())
}

/// Derives an event id from its position in the log.
#[must_use]
pub fn event_id(sequence: u64, name: &str, timestamp: i64) -> EventId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"actp:event:");
    hasher.update(&sequence.to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(&timestamp.to_le_bytes());
    EventId::from_hash(hasher.finalize())
}
