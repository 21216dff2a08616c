//! Protocol configuration.
//!
//! Protocol-wide bounds and rates shared by every transaction:
//! - Platform fee rate and its ceiling
//! - Cancellation penalty
//! - Amount, deadline and dispute-window bounds
//! - Treasury and mediator addresses

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, BasisPoints, CoreError};

/// One day in seconds.
pub const DAY_SECS: u32 = 86_400;

/// Protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Platform fee charged on provider-bound payouts.
    pub platform_fee_bps: BasisPoints,
    /// Upper bound an administrator may raise the platform fee to.
    pub max_platform_fee_bps: BasisPoints,
    /// Penalty withheld from a requester cancelling a funded transaction.
    pub cancellation_penalty_bps: BasisPoints,
    /// Smallest transaction amount.
    pub min_amount: Amount,
    /// Largest transaction amount.
    pub max_amount: Amount,
    /// Shortest dispute window in seconds.
    pub min_dispute_window_secs: u32,
    /// Longest dispute window in seconds.
    pub max_dispute_window_secs: u32,
    /// Dispute window used when the requester does not pick one.
    pub default_dispute_window_secs: u32,
    /// How far in the future a deadline may be set, in seconds.
    pub max_deadline_horizon_secs: u64,
    /// Account credited with platform fees.
    pub treasury: Address,
    /// Privileged role that resolves disputes and adjusts the platform fee.
    pub mediator: Address,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: BasisPoints::new(100).unwrap_or_default(),
            max_platform_fee_bps: BasisPoints::new(500).unwrap_or_default(),
            cancellation_penalty_bps: BasisPoints::new(500).unwrap_or_default(),
            min_amount: Amount::from_cents(0, 5),
            max_amount: Amount::from_units(1_000_000_000),
            min_dispute_window_secs: 3_600,
            max_dispute_window_secs: 30 * DAY_SECS,
            default_dispute_window_secs: 2 * DAY_SECS,
            max_deadline_horizon_secs: 365 * u64::from(DAY_SECS),
            treasury: Address::named("treasury"),
            mediator: Address::named("mediator"),
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let config: Self =
            toml::from_str(content).map_err(|e| CoreError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any bound is inverted or a rate exceeds its ceiling.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.platform_fee_bps > self.max_platform_fee_bps {
            return Err(CoreError::Config(format!(
                "platform_fee_bps ({}) exceeds max_platform_fee_bps ({})",
                self.platform_fee_bps, self.max_platform_fee_bps
            )));
        }

        if self.min_amount.is_zero() {
            return Err(CoreError::Config("min_amount must be positive".to_string()));
        }

        if self.min_amount > self.max_amount {
            return Err(CoreError::Config(
                "min_amount cannot exceed max_amount".to_string(),
            ));
        }

        if self.min_dispute_window_secs > self.max_dispute_window_secs {
            return Err(CoreError::Config(
                "min_dispute_window_secs cannot exceed max_dispute_window_secs".to_string(),
            ));
        }

        if !(self.min_dispute_window_secs..=self.max_dispute_window_secs)
            .contains(&self.default_dispute_window_secs)
        {
            return Err(CoreError::Config(
                "default_dispute_window_secs must lie within the dispute window bounds"
                    .to_string(),
            ));
        }

        if self.max_deadline_horizon_secs == 0 {
            return Err(CoreError::Config(
                "max_deadline_horizon_secs must be positive".to_string(),
            ));
        }

        if self.treasury == self.mediator {
            return Err(CoreError::Config(
                "treasury and mediator must be distinct addresses".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.platform_fee_bps.get(), 100);
        assert_eq!(config.cancellation_penalty_bps.get(), 500);
        assert_eq!(config.min_amount, Amount::from_micros(50_000));
    }

    #[test]
    fn from_toml_overrides_and_defaults() {
        let config = ProtocolConfig::from_toml(
            r#"
            platform_fee_bps = 250
            min_amount = "1.5"
            "#,
        )
        .unwrap();

        assert_eq!(config.platform_fee_bps.get(), 250);
        assert_eq!(config.min_amount, Amount::from_cents(1, 50));
        assert_eq!(config.max_platform_fee_bps.get(), 500);
        assert_eq!(config.treasury, Address::named("treasury"));
    }

    #[test]
    fn from_toml_rejects_fee_over_ceiling() {
        let err = ProtocolConfig::from_toml("platform_fee_bps = 900").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn from_toml_rejects_malformed() {
        assert!(ProtocolConfig::from_toml("platform_fee_bps = \"lots\"").is_err());
        assert!(ProtocolConfig::from_toml("min_amount = \"-1\"").is_err());
    }

    #[test]
    fn validate_rejects_inverted_windows() {
        let config = ProtocolConfig {
            min_dispute_window_secs: 10,
            max_dispute_window_secs: 5,
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_shared_treasury_and_mediator() {
        let config = ProtocolConfig {
            mediator: Address::named("treasury"),
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cancellation_penalty_bps = 1000").unwrap();
        let config = ProtocolConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cancellation_penalty_bps.get(), 1000);
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let err = ProtocolConfig::from_file("/nonexistent/actp.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
