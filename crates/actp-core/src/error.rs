//! Error types for actp-core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in ACTP core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Invalid amount (overflow, malformed, or negative).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed participant address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Basis-point rate outside `0..=10000`.
    #[error("invalid rate: {0} bps")]
    InvalidRate(u32),

    /// Configuration could not be read or failed validation.
    #[error("config error: {0}")]
    Config(String),
}
