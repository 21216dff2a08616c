//! Participant addresses.
//!
//! An [`Address`] is a `0x`-prefixed, 20-byte lowercase hex identifier. The
//! engine never derives addresses from keys; it only records which address
//! plays which role. [`Address::named`] gives reproducible addresses for
//! simulations and tests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Number of bytes in an address.
pub const ADDRESS_BYTES: usize = 20;

const NAMED_DOMAIN: &str = "actp:participant:";

/// A participant address (`0x` + 40 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and normalizes an address string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAddress`] if the string is not `0x` followed
    /// by exactly 40 hex characters.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| CoreError::InvalidAddress(format!("missing 0x prefix: {s}")))?;

        if hex.len() != ADDRESS_BYTES * 2 {
            return Err(CoreError::InvalidAddress(format!(
                "expected {} hex characters, got {}",
                ADDRESS_BYTES * 2,
                hex.len()
            )));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidAddress(format!("non-hex character in {s}")));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// Deterministic address for a named participant.
    ///
    /// The same name always yields the same address.
    #[must_use]
    pub fn named(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(NAMED_DOMAIN.as_bytes());
        hasher.update(name.as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(format!("0x{}", &hex[..ADDRESS_BYTES * 2]))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_is_deterministic() {
        assert_eq!(Address::named("alice"), Address::named("alice"));
        assert_ne!(Address::named("alice"), Address::named("bob"));
    }

    #[test]
    fn named_has_address_shape() {
        let addr = Address::named("provider");
        assert!(addr.as_str().starts_with("0x"));
        assert_eq!(addr.as_str().len(), 42);
        assert!(Address::parse(addr.as_str()).is_ok());
    }

    #[test]
    fn parse_normalizes_case() {
        let addr = Address::parse("0xABCDEFabcdef0123456789abcdef0123456789AB").unwrap();
        assert_eq!(addr.as_str(), "0xabcdefabcdef0123456789abcdef0123456789ab");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Address::parse("abcdef").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn serde_roundtrip_validates() {
        let addr = Address::named("carol");
        let json = serde_json::to_string(&addr).unwrap();
        let restored: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, restored);

        let bad: Result<Address, _> = serde_json::from_str(r#""not-an-address""#);
        assert!(bad.is_err());
    }
}
