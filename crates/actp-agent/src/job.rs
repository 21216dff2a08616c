//! Jobs and the handler capability that performs them.

use actp_core::{Address, Amount};
use actp_kernel::{Transaction, TxId};

use crate::error::Result;

/// Work requested under a transaction.
///
/// `input` is opaque to the ledger; only the handler interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// The transaction paying for the work.
    pub tx_id: TxId,
    /// Handler-specific input.
    pub input: Vec<u8>,
    /// What the requester is paying.
    pub budget: Amount,
    /// Paying party.
    pub requester: Address,
    /// Party expected to do the work.
    pub provider: Address,
    /// Billable units of work the input represents.
    pub units: u64,
}

impl Job {
    /// Builds a job for an existing transaction; the budget is its amount.
    #[must_use]
    pub fn for_transaction(tx: &Transaction, input: impl Into<Vec<u8>>, units: u64) -> Self {
        Self {
            tx_id: tx.id.clone(),
            input: input.into(),
            budget: tx.amount,
            requester: tx.requester.clone(),
            provider: tx.provider.clone(),
            units,
        }
    }
}

/// Performs a job: bytes in, bytes out.
///
/// An `Err` means the work failed and the requester should be refunded.
pub trait JobHandler: Send + Sync {
    /// Runs the job and returns its result payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the work cannot be completed.
    fn handle(&self, job: &Job) -> Result<Vec<u8>>;
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> Result<Vec<u8>> + Send + Sync,
{
    fn handle(&self, job: &Job) -> Result<Vec<u8>> {
        self(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    fn job(input: &[u8]) -> Job {
        Job {
            tx_id: TxId::new("0x01"),
            input: input.to_vec(),
            budget: Amount::from_units(1),
            requester: Address::named("requester"),
            provider: Address::named("provider"),
            units: 1,
        }
    }

    #[test]
    fn closures_are_handlers() {
        let upper = |job: &Job| -> Result<Vec<u8>> { Ok(job.input.to_ascii_uppercase()) };
        assert_eq!(upper.handle(&job(b"abc")).unwrap(), b"ABC".to_vec());
    }

    #[test]
    fn handler_errors_pass_through() {
        let failing = |_: &Job| -> Result<Vec<u8>> { Err(AgentError::execution("gpu unavailable")) };
        assert_eq!(
            failing.handle(&job(b"")).unwrap_err(),
            AgentError::ExecutionFailed("gpu unavailable".to_string())
        );
    }
}
