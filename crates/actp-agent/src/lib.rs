//! # actp-agent
//!
//! Provider-side logic for ACTP participants.
//!
//! This crate provides:
//!
//! - **Pricing engine**: [`calculate_price`] turns a [`CostModel`] and margin into a [`PriceQuote`]
//! - **Acceptance policy**: [`evaluate_job`] decides accept, counter-offer or reject
//! - **Job capability**: [`JobHandler`] performs a [`Job`], bytes in and bytes out
//! - **Provider agent**: [`ProviderAgent`] drives a committed transaction to delivery
//!
//! ## Example
//!
//! ```rust
//! use actp_core::Amount;
//! use actp_agent::{evaluate_job, CostModel, ProviderConfig};
//!
//! let config = ProviderConfig::new(
//!     CostModel::new(Amount::from_units(3), Amount::from_units(1), "page"),
//!     0.2,
//! );
//!
//! // cost 8.00, price 10.00
//! let eval = evaluate_job(&config, Amount::from_units(10), 5).unwrap();
//! assert!(eval.decision.is_accept());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod job;
pub mod policy;
pub mod pricing;
pub mod provider;

pub use error::{AgentError, Result};
pub use job::{Job, JobHandler};
pub use policy::{evaluate_job, JobDecision, JobEvaluation, ProviderConfig};
pub use pricing::{calculate_price, CostModel, PriceQuote, MAX_PRICE, MIN_PRICE};
pub use provider::{ProviderAgent, ServeOutcome};
