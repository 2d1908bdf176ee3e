use crate::error::{CivicError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized, checksummed account address.
///
/// Normalization is applied exactly once at every public boundary; internal
/// comparisons and storage keys always use the checksummed form. The checksum
/// casing is derived from a blake3 digest of the lowercase hex body, so two
/// differently-cased inputs for the same account normalize identically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Parse and normalize an address string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| CivicError::InvalidAddress(format!("missing 0x prefix: {}", trimmed)))?;

        if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CivicError::InvalidAddress(format!(
                "expected 40 hex characters, got {:?}",
                trimmed
            )));
        }

        let lower = body.to_ascii_lowercase();
        Ok(Self(format!("0x{}", checksum_case(&lower))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log fields.
    pub fn short(&self) -> &str {
        &self.0[..10]
    }
}

/// Apply mixed-case checksum to a lowercase hex body.
fn checksum_case(lower: &str) -> String {
    let digest = blake3::hash(lower.as_bytes());
    let digest_hex = hex::encode(digest.as_bytes());

    lower
        .chars()
        .zip(digest_hex.chars())
        .map(|(c, d)| {
            if c.is_ascii_alphabetic() && d.to_digit(16).unwrap_or(0) >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_is_case_insensitive() {
        let a = Identity::parse("0xAAbbCCdd00112233445566778899aabbccddeeff").unwrap();
        let b = Identity::parse("0xaabbccdd00112233445566778899AABBCCDDEEFF").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_checksum_is_stable() {
        let a = Identity::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap();
        let b = Identity::parse(a.as_str()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Identity::parse("not an address").is_err());
        assert!(Identity::parse("0x1234").is_err());
        assert!(Identity::parse("0xzz08400098527886e0f7030069857d2e4169ee7a").is_err());
        assert!(Identity::parse("").is_err());
    }

    #[test]
    fn test_whitespace_trimmed() {
        let a = Identity::parse("  0xaabbccdd00112233445566778899aabbccddeeff \n").unwrap();
        assert!(a.as_str().starts_with("0x"));
        assert_eq!(a.as_str().len(), 42);
    }
}
