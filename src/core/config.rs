//! Pool configuration
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! pool_size = 8388608
//! undo_log_size = 1048576
//! durability = "strict"
//! ```

use crate::core::header::PoolHeader;
use crate::error::{ColonyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default pool size (8 MiB)
pub const DEFAULT_POOL_SIZE: u64 = 8 * 1024 * 1024;

/// Default undo log size (1 MiB)
pub const DEFAULT_UNDO_LOG_SIZE: u64 = 1024 * 1024;

/// Smallest pool accepted
pub const MIN_POOL_SIZE: u64 = 64 * 1024;

/// Smallest undo log accepted
pub const MIN_UNDO_LOG_SIZE: u64 = 4096;

/// Smallest heap a pool must be left with once header, log and bitmap are
/// laid out
pub const MIN_HEAP_SIZE: u64 = 16 * 1024;

/// When undo entries reach the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Flush every undo entry before the protected bytes may change
    #[default]
    Strict,
    /// Flush only at commit and abort; a crash mid-transaction may lose the
    /// ability to roll back
    Relaxed,
}

/// Pool creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Total pool size in bytes
    pub pool_size: u64,

    /// Undo log region size in bytes
    pub undo_log_size: u64,

    /// Undo log flush policy
    pub durability: Durability,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            pool_size: DEFAULT_POOL_SIZE,
            undo_log_size: DEFAULT_UNDO_LOG_SIZE,
            durability: Durability::Strict,
        }
    }
}

impl PoolConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PoolConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size < MIN_POOL_SIZE {
            return Err(ColonyError::Config(format!(
                "pool_size {} is below the minimum of {} bytes",
                self.pool_size, MIN_POOL_SIZE
            )));
        }

        if self.undo_log_size < MIN_UNDO_LOG_SIZE || self.undo_log_size % 8 != 0 {
            return Err(ColonyError::Config(format!(
                "undo_log_size {} must be a multiple of 8 and at least {} bytes",
                self.undo_log_size, MIN_UNDO_LOG_SIZE
            )));
        }

        let heap = PoolHeader::with_geometry(self.pool_size, self.undo_log_size, 0)
            .map(|header| header.heap_size())
            .unwrap_or(0);
        if heap < MIN_HEAP_SIZE {
            return Err(ColonyError::Config(format!(
                "undo_log_size {} leaves a heap of {} bytes in a pool of {} bytes (minimum {})",
                self.undo_log_size, heap, self.pool_size, MIN_HEAP_SIZE
            )));
        }

        Ok(())
    }
}
