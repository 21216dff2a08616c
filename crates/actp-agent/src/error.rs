//! Error types for actp-agent.

use actp_core::{Address, CoreError};
use actp_kernel::{LedgerError, TransactionState, TxId};
use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur in agent operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Price computation failed.
    #[error("pricing failed: {0}")]
    Pricing(String),

    /// Provider configuration is inconsistent.
    #[error("invalid provider config: {0}")]
    InvalidConfig(String),

    /// The job handler failed.
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),

    /// The job names a different provider.
    #[error("job for transaction {tx_id} is not assigned to {provider}")]
    NotAssigned {
        /// The transaction.
        tx_id: TxId,
        /// This agent's address.
        provider: Address,
    },

    /// The job disagrees with the transaction it names.
    #[error("job does not match transaction {tx_id}: {reason}")]
    JobMismatch {
        /// The transaction.
        tx_id: TxId,
        /// Which field differs.
        reason: String,
    },

    /// The transaction is not ready for work.
    #[error("transaction {tx_id} is {state}, expected COMMITTED")]
    NotCommitted {
        /// The transaction.
        tx_id: TxId,
        /// Its current state.
        state: TransactionState,
    },

    /// Ledger rejected an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Error from a core primitive.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AgentError {
    /// Create an execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }
}
