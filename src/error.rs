//! Error types for pool and colony operations

use crate::colony::element::ElementKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColonyError {
    #[error("Invalid magic number in pool header")]
    InvalidMagic,

    #[error("Unsupported pool format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Pool header checksum verification failed")]
    HeaderChecksumMismatch,

    #[error("Invalid pool geometry: {0}")]
    InvalidGeometry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Out of space: no free run of {requested} bytes in the heap")]
    OutOfSpace { requested: u64 },

    #[error("Allocation of {requested} bytes exceeds the maximum of {max} bytes")]
    AllocationTooLarge { requested: u64, max: u64 },

    #[error("Invalid handle: {0:#x}")]
    InvalidHandle(u64),

    #[error("Double free of handle {0:#x}")]
    DoubleFree(u64),

    #[error("No transaction is open")]
    NoActiveTransaction,

    #[error("A transaction is already open")]
    TransactionInProgress,

    #[error("Undo log full: entry needs {needed} bytes, {available} available")]
    UndoLogFull { needed: u64, available: u64 },

    #[error("Undo log corrupted: {0}")]
    UndoLogCorrupted(String),

    #[error("Range {offset:#x}+{len} is outside the writable pool area")]
    OutOfBounds { offset: u64, len: u64 },

    #[error("Injected fault")]
    InjectedFault,

    #[error("Colony not found: {0}")]
    ColonyNotFound(String),

    #[error("Colony already exists: {0}")]
    ColonyExists(String),

    #[error("Invalid colony name: {0} (1-29 characters of A-Z, a-z, 0-9, '_', '.', '-')")]
    InvalidColonyName(String),

    #[error("Invalid block capacity: {0} (must be at least 1)")]
    InvalidBlockCapacity(u64),

    #[error("Block capacity {capacity} too large: a block table would exceed {max} bytes")]
    BlockCapacityTooLarge { capacity: u64, max: u64 },

    #[error("Wrong element kind: colony holds {expected}, got {found}")]
    WrongElementKind {
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("Unknown element kind: {0} (supported: int, ref)")]
    UnknownElementKind(String),

    #[error("Index {index} is out of range (capacity {capacity})")]
    IndexOutOfRange { index: u64, capacity: u64 },

    #[error("The item with index {0} does not exist")]
    NotPresent(u64),

    #[error("Invalid range: {from}..={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("Colony structure corrupted: {0}")]
    Corrupted(String),
}

impl ColonyError {
    /// True for errors caused by the request itself, detected before any
    /// transaction is opened.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ColonyError::ColonyNotFound(_)
                | ColonyError::ColonyExists(_)
                | ColonyError::InvalidColonyName(_)
                | ColonyError::InvalidBlockCapacity(_)
                | ColonyError::BlockCapacityTooLarge { .. }
                | ColonyError::WrongElementKind { .. }
                | ColonyError::UnknownElementKind(_)
                | ColonyError::IndexOutOfRange { .. }
                | ColonyError::NotPresent(_)
                | ColonyError::InvalidRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ColonyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_error_classification() {
        assert!(ColonyError::NotPresent(3).is_caller_error());
        assert!(ColonyError::IndexOutOfRange {
            index: 9,
            capacity: 4
        }
        .is_caller_error());
        assert!(!ColonyError::OutOfSpace { requested: 64 }.is_caller_error());
        assert!(!ColonyError::InjectedFault.is_caller_error());
    }

    #[test]
    fn test_error_messages() {
        let err = ColonyError::NotPresent(7);
        assert_eq!(err.to_string(), "The item with index 7 does not exist");

        let err = ColonyError::WrongElementKind {
            expected: ElementKind::Int,
            found: ElementKind::ObjectRef,
        };
        assert_eq!(
            err.to_string(),
            "Wrong element kind: colony holds int, got ref"
        );
    }
}
