//! # actp-core
//!
//! Primitives for the ACTP settlement engine.
//!
//! This crate provides:
//!
//! - [`Amount`]: Stablecoin amount with 6-decimal fixed-point precision
//! - [`Address`]: Participant identifiers, including deterministic named addresses
//! - [`fees`]: Platform fee and cancellation penalty arithmetic
//! - [`ProtocolConfig`]: Protocol-wide bounds and rates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod amount;
pub mod config;
pub mod error;
pub mod fees;

pub use address::Address;
pub use amount::Amount;
pub use config::ProtocolConfig;
pub use error::{CoreError, Result};
pub use fees::{BasisPoints, FeeSplit, BPS_DENOMINATOR};
