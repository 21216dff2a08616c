//! Error types for the settlement kernel.
//!
//! Every error is recoverable by the caller: a failed operation leaves the
//! ledger untouched. [`LedgerError::kind`], [`LedgerError::details`] and
//! [`LedgerError::guidance`] give callers enough structure to decide between
//! retrying, aborting, and surfacing the problem to a user.

use std::collections::BTreeMap;
use std::fmt;

use actp_core::{Address, Amount, CoreError};
use thiserror::Error;

use crate::ids::{EscrowId, TxId};
use crate::state::TransactionState;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-bounds input.
    Validation,
    /// Edge not in the transition table, or operation invalid in the current state.
    InvalidStateTransition,
    /// Debit exceeds an account balance.
    InsufficientFunds,
    /// Payout or refund exceeds what remains in escrow.
    EscrowInsufficientBalance,
    /// Unknown transaction or escrow.
    NotFound,
    /// Actor not permitted for the attempted action.
    Unauthorized,
    /// Action attempted after its deadline.
    DeadlineExpired,
    /// Dispute attempted after the dispute window closed.
    WindowClosed,
    /// Action attempted before it becomes available.
    TooEarly,
    /// The durable substrate rejected a commit.
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::InvalidStateTransition => "invalid_state_transition",
            Self::InsufficientFunds => "insufficient_funds",
            Self::EscrowInsufficientBalance => "escrow_insufficient_balance",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::DeadlineExpired => "deadline_expired",
            Self::WindowClosed => "window_closed",
            Self::TooEarly => "too_early",
            Self::Persistence => "persistence",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Input failed validation.
    #[error("validation failed for {field}: {message}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Attempted edge is not in the transition table.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// The current state.
        from: TransactionState,
        /// The attempted target state.
        to: TransactionState,
        /// States reachable from `from`.
        valid_targets: Vec<TransactionState>,
    },

    /// Operation is not available in the transaction's current state.
    #[error("{operation} not allowed for transaction {tx_id} in state {state}")]
    InvalidState {
        /// The transaction.
        tx_id: TxId,
        /// Its current state.
        state: TransactionState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Account balance is too low for a debit.
    #[error("insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        /// Account being debited.
        account: Address,
        /// Amount required.
        required: Amount,
        /// Amount currently available.
        available: Amount,
    },

    /// Escrow does not hold enough to cover a disbursement.
    #[error("escrow {escrow_id} has {remaining} remaining, cannot disburse {requested}")]
    EscrowInsufficientBalance {
        /// The escrow.
        escrow_id: EscrowId,
        /// Amount asked for.
        requested: Amount,
        /// Amount still held.
        remaining: Amount,
    },

    /// Unknown identifier.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record looked up.
        entity: &'static str,
        /// The identifier.
        id: String,
    },

    /// Actor is not allowed to perform the action.
    #[error("{actor} is not authorized to {action}")]
    Unauthorized {
        /// Caller address.
        actor: Address,
        /// The attempted action.
        action: String,
    },

    /// The transaction deadline has passed.
    #[error("deadline {deadline} has passed (now {now})")]
    DeadlineExpired {
        /// Transaction deadline (Unix seconds).
        deadline: i64,
        /// Time of the attempt.
        now: i64,
    },

    /// Requester cancellation attempted before the deadline.
    #[error("deadline {deadline} not reached yet (now {now})")]
    DeadlineNotReached {
        /// Transaction deadline (Unix seconds).
        deadline: i64,
        /// Time of the attempt.
        now: i64,
    },

    /// Dispute window already closed.
    #[error("dispute window closed at {closed_at} (now {now})")]
    WindowClosed {
        /// When the window closed.
        closed_at: i64,
        /// Time of the attempt.
        now: i64,
    },

    /// Provider tried to settle while the requester may still dispute.
    #[error("dispute window open until {closes_at} (now {now})")]
    DisputeWindowOpen {
        /// When the window closes.
        closes_at: i64,
        /// Time of the attempt.
        now: i64,
    },

    /// A disputed transaction cannot settle without a resolution.
    #[error("transaction {tx_id} needs a resolution distribution before settling")]
    ResolutionRequired {
        /// The disputed transaction.
        tx_id: TxId,
    },

    /// Persisting a snapshot failed; nothing was committed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Error from a core primitive.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(actor: &Address, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor: actor.clone(),
            action: action.into(),
        }
    }

    /// Create a not-found error for a transaction.
    #[must_use]
    pub fn transaction_not_found(id: &TxId) -> Self {
        Self::NotFound {
            entity: "transaction",
            id: id.to_string(),
        }
    }

    /// Create a not-found error for an escrow.
    #[must_use]
    pub fn escrow_not_found(id: &EscrowId) -> Self {
        Self::NotFound {
            entity: "escrow",
            id: id.to_string(),
        }
    }

    /// Returns the coarse error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::ResolutionRequired { .. } | Self::Core(_) => {
                ErrorKind::Validation
            }
            Self::InvalidStateTransition { .. } | Self::InvalidState { .. } => {
                ErrorKind::InvalidStateTransition
            }
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::EscrowInsufficientBalance { .. } => ErrorKind::EscrowInsufficientBalance,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::DeadlineExpired { .. } => ErrorKind::DeadlineExpired,
            Self::WindowClosed { .. } => ErrorKind::WindowClosed,
            Self::DeadlineNotReached { .. } | Self::DisputeWindowOpen { .. } => ErrorKind::TooEarly,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Structured detail for callers and logs.
    #[must_use]
    pub fn details(&self) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        let mut put = |k: &str, v: String| {
            details.insert(k.to_string(), v);
        };

        match self {
            Self::Validation { field, message } => {
                put("field", (*field).to_string());
                put("message", message.clone());
            }
            Self::InvalidStateTransition {
                from,
                to,
                valid_targets,
            } => {
                put("from", from.to_string());
                put("to", to.to_string());
                let targets: Vec<String> = valid_targets.iter().map(ToString::to_string).collect();
                put("validTargets", targets.join(","));
            }
            Self::InvalidState {
                tx_id,
                state,
                operation,
            } => {
                put("txId", tx_id.to_string());
                put("state", state.to_string());
                put("operation", (*operation).to_string());
            }
            Self::InsufficientFunds {
                account,
                required,
                available,
            } => {
                put("account", account.to_string());
                put("required", required.to_string());
                put("available", available.to_string());
            }
            Self::EscrowInsufficientBalance {
                escrow_id,
                requested,
                remaining,
            } => {
                put("escrowId", escrow_id.to_string());
                put("requested", requested.to_string());
                put("remaining", remaining.to_string());
            }
            Self::NotFound { entity, id } => {
                put("entity", (*entity).to_string());
                put("id", id.clone());
            }
            Self::Unauthorized { actor, action } => {
                put("actor", actor.to_string());
                put("action", action.clone());
            }
            Self::DeadlineExpired { deadline, now } | Self::DeadlineNotReached { deadline, now } => {
                put("deadline", deadline.to_string());
                put("now", now.to_string());
            }
            Self::WindowClosed { closed_at, now } => {
                put("closedAt", closed_at.to_string());
                put("now", now.to_string());
            }
            Self::DisputeWindowOpen { closes_at, now } => {
                put("closesAt", closes_at.to_string());
                put("now", now.to_string());
            }
            Self::ResolutionRequired { tx_id } => put("txId", tx_id.to_string()),
            Self::Persistence(message) => put("message", message.clone()),
            Self::Core(e) => put("message", e.to_string()),
        }

        details
    }

    /// Actionable hint for surfacing the error to a user.
    #[must_use]
    pub const fn guidance(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::Core(_) => "check the request parameters",
            Self::InvalidStateTransition { .. } | Self::InvalidState { .. } => {
                "refresh the transaction state; the action is not available from here"
            }
            Self::InsufficientFunds { .. } => "fund your account",
            Self::EscrowInsufficientBalance { .. } => "request no more than the escrow still holds",
            Self::NotFound { .. } => "check the identifier",
            Self::Unauthorized { .. } => "this action belongs to another party",
            Self::DeadlineExpired { .. } => "the deadline has passed; cancel or create a new transaction",
            Self::DeadlineNotReached { .. } => "wait for the deadline",
            Self::WindowClosed { .. } => "the dispute window has closed; settle instead",
            Self::DisputeWindowOpen { .. } => "wait for the dispute window to close",
            Self::ResolutionRequired { .. } => "submit a resolution distribution first",
            Self::Persistence(_) => "retry once storage is available",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_variants() {
        let err = LedgerError::validation("amount", "too small");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = LedgerError::DeadlineNotReached { deadline: 10, now: 5 };
        assert_eq!(err.kind(), ErrorKind::TooEarly);
        assert_eq!(err.guidance(), "wait for the deadline");
    }

    #[test]
    fn transition_details_list_targets() {
        let err = LedgerError::InvalidStateTransition {
            from: TransactionState::Settled,
            to: TransactionState::Settled,
            valid_targets: vec![],
        };
        let details = err.details();
        assert_eq!(details["from"], "SETTLED");
        assert_eq!(details["validTargets"], "");
    }

    #[test]
    fn insufficient_funds_details() {
        let err = LedgerError::InsufficientFunds {
            account: Address::named("alice"),
            required: Amount::from_units(10),
            available: Amount::from_units(3),
        };
        let details = err.details();
        assert_eq!(details["required"], "10.000000 USDC");
        assert_eq!(err.guidance(), "fund your account");
        assert!(err.to_string().contains("insufficient funds"));
    }

    #[test]
    fn core_errors_convert() {
        let err: LedgerError = CoreError::InvalidRate(20_000).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
