//! Validation for colony names
//!
//! Colony names live in a fixed 32-byte field of the colony record, so they
//! are restricted to a short, printable alphabet that round-trips through the
//! command line unchanged.

use crate::error::{ColonyError, Result};
use regex::Regex;

/// Length of the on-pool name field
pub const NAME_FIELD_LEN: usize = 32;

/// A validated colony name
///
/// # Rules
/// - ASCII letters, digits, `_`, `.` and `-` only
/// - Length: 1-29 bytes
///
/// Longer names are rejected rather than truncated, so two names can never
/// collapse onto the same record.
///
/// # Examples
///
/// ```
/// use colony_rs::core::validation::ColonyName;
///
/// let name = ColonyName::new("sensor_readings.v2").unwrap();
/// assert_eq!(name.as_str(), "sensor_readings.v2");
///
/// assert!(ColonyName::new("").is_err());
/// assert!(ColonyName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColonyName(String);

impl ColonyName {
    const PATTERN: &'static str = r"^[A-Za-z0-9_.\-]+$";

    /// Maximum length in bytes
    pub const MAX_LENGTH: usize = 29;

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;
        Ok(ColonyName(name))
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(ColonyError::InvalidColonyName(name.to_string()));
        }

        let re = Regex::new(Self::PATTERN)
            .map_err(|e| ColonyError::Config(format!("name pattern: {}", e)))?;
        if !re.is_match(name) {
            return Err(ColonyError::InvalidColonyName(name.to_string()));
        }

        Ok(())
    }

    /// Decode the zero-padded on-pool name field
    pub fn from_field(field: &[u8]) -> Result<Self> {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let name = std::str::from_utf8(&field[..end])
            .map_err(|_| ColonyError::Corrupted("colony name is not UTF-8".into()))?;
        Self::new(name)
    }

    /// Encode as a zero-padded on-pool name field
    pub fn to_field(&self) -> [u8; NAME_FIELD_LEN] {
        let mut field = [0u8; NAME_FIELD_LEN];
        field[..self.0.len()].copy_from_slice(self.0.as_bytes());
        field
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for ColonyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ColonyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(ColonyName::new("a").is_ok());
        assert!(ColonyName::new("Colony_1").is_ok());
        assert!(ColonyName::new("readings.2024-10").is_ok());
        assert!(ColonyName::new("x".repeat(29)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(ColonyName::new("").is_err());
        assert!(ColonyName::new("x".repeat(30)).is_err());
        assert!(ColonyName::new("with space").is_err());
        assert!(ColonyName::new("slash/name").is_err());
        assert!(ColonyName::new("ünïcode").is_err());
    }

    #[test]
    fn test_field_round_trip() {
        let name = ColonyName::new("colony-7").unwrap();
        let field = name.to_field();

        assert_eq!(&field[..8], b"colony-7");
        assert!(field[8..].iter().all(|&b| b == 0));
        assert_eq!(ColonyName::from_field(&field).unwrap(), name);
    }

    #[test]
    fn test_corrupted_field() {
        let mut field = [0u8; NAME_FIELD_LEN];
        field[0] = 0xFF;
        assert!(ColonyName::from_field(&field).is_err());
    }
}
