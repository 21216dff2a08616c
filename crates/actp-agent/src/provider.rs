//! Provider agent: evaluates jobs, performs them, and moves the transaction
//! through its work states.
//!
//! A served job ends in one of three ways:
//! - declined, leaving the transaction untouched for the requester to renegotiate
//! - delivered, with a blake3 digest of the result stored as delivery proof
//! - cancelled by the provider after a handler failure, refunding the requester in full

use actp_core::Address;
use actp_kernel::{TransactionEngine, TransactionState, TxId};
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::job::{Job, JobHandler};
use crate::policy::{evaluate_job, JobEvaluation, ProviderConfig};

/// What happened to a served job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The acceptance policy did not accept the job.
    Declined {
        /// The decision and quote.
        evaluation: JobEvaluation,
    },
    /// Work completed and the transaction is `DELIVERED`.
    Delivered {
        /// The transaction.
        tx_id: TxId,
        /// Handler output.
        result: Vec<u8>,
        /// Digest recorded as delivery proof.
        proof: [u8; 32],
    },
    /// Work failed and the transaction was cancelled with a full refund.
    Refunded {
        /// The transaction.
        tx_id: TxId,
        /// Why the handler failed.
        reason: String,
    },
}

impl ServeOutcome {
    /// Returns true if the job was delivered.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// A provider that performs jobs with a [`JobHandler`].
#[derive(Debug)]
pub struct ProviderAgent<H> {
    address: Address,
    config: ProviderConfig,
    handler: H,
}

impl<H: JobHandler> ProviderAgent<H> {
    /// Creates an agent acting as `address`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] if `config` fails validation.
    pub fn new(address: Address, config: ProviderConfig, handler: H) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            address,
            config,
            handler,
        })
    }

    /// The agent's address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// The agent's pricing and acceptance configuration.
    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Serves one job for a `COMMITTED` transaction.
    ///
    /// # Errors
    ///
    /// - [`AgentError::NotAssigned`] if the job or transaction names another provider
    /// - [`AgentError::JobMismatch`] if the job's requester or budget differ from the transaction
    /// - [`AgentError::NotCommitted`] if the transaction is not `COMMITTED`
    /// - [`AgentError::Ledger`] if the engine rejects a transition
    pub fn serve(&self, engine: &TransactionEngine, job: &Job) -> Result<ServeOutcome> {
        if job.provider != self.address {
            return Err(AgentError::NotAssigned {
                tx_id: job.tx_id.clone(),
                provider: self.address.clone(),
            });
        }

        let tx = engine.transaction(&job.tx_id)?;
        if tx.provider != self.address {
            return Err(AgentError::NotAssigned {
                tx_id: job.tx_id.clone(),
                provider: self.address.clone(),
            });
        }
        if job.requester != tx.requester {
            return Err(AgentError::JobMismatch {
                tx_id: job.tx_id.clone(),
                reason: format!("requester {} is not {}", job.requester, tx.requester),
            });
        }
        if job.budget != tx.amount {
            return Err(AgentError::JobMismatch {
                tx_id: job.tx_id.clone(),
                reason: format!("budget {} differs from escrowed {}", job.budget, tx.amount),
            });
        }
        if tx.state != TransactionState::Committed {
            return Err(AgentError::NotCommitted {
                tx_id: job.tx_id.clone(),
                state: tx.state,
            });
        }

        let evaluation = evaluate_job(&self.config, tx.amount, job.units)?;
        if !evaluation.decision.is_accept() {
            info!(
                tx_id = %job.tx_id,
                budget = %tx.amount,
                price = %evaluation.quote.price,
                reason = evaluation.decision.reason().unwrap_or_default(),
                "job declined"
            );
            return Ok(ServeOutcome::Declined { evaluation });
        }

        engine.transition_state(&self.address, &job.tx_id, TransactionState::InProgress, None)?;

        match self.handler.handle(job) {
            Ok(result) => {
                let proof = *blake3::hash(&result).as_bytes();
                engine.transition_state(
                    &self.address,
                    &job.tx_id,
                    TransactionState::Delivered,
                    Some(proof.to_vec()),
                )?;
                info!(tx_id = %job.tx_id, bytes = result.len(), "job delivered");
                Ok(ServeOutcome::Delivered {
                    tx_id: job.tx_id.clone(),
                    result,
                    proof,
                })
            }
            Err(e) => {
                warn!(tx_id = %job.tx_id, error = %e, "job failed, refunding requester");
                engine.transition_state(&self.address, &job.tx_id, TransactionState::Cancelled, None)?;
                Ok(ServeOutcome::Refunded {
                    tx_id: job.tx_id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
