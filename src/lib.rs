//! # colony-rs - crash-consistent segmented containers
//!
//! A colony is a container of fixed-width elements with stable indices,
//! O(1) insert and remove, and cheap reuse of removed slots. Colonies live
//! inside a pool: a memory-mapped file with its own allocator and undo log,
//! so every insert or remove either lands completely or not at all, even
//! across a crash.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colony_rs::{Colony, ElementKind, PoolBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut pool = PoolBuilder::new().open_or_create("data.colony")?;
//!
//! let colony = match Colony::open(&pool, "readings") {
//!     Ok(colony) => colony,
//!     Err(_) => Colony::create(&mut pool, "readings", ElementKind::Int, 64)?,
//! };
//!
//! let idx = colony.insert(&mut pool, 42i32)?;
//! colony.remove(&mut pool, idx)?;
//! println!("{}", colony.stats(&pool)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing a pool
//!
//! A colony does no locking of its own. Wrap the pool in a [`SharedPool`]
//! to serialize writers across threads:
//!
//! ```rust
//! use colony_rs::{Colony, ElementKind, PoolBuilder};
//!
//! let pool = PoolBuilder::new().in_memory().unwrap().into_shared();
//! let colony = {
//!     let mut guard = pool.lock();
//!     Colony::create(&mut *guard, "shared", ElementKind::Int, 8).unwrap()
//! };
//! colony.insert(&mut *pool.lock(), 1i32).unwrap();
//! ```

pub mod colony;
pub mod core;
pub mod error;

pub use crate::colony::{Colony, ColonyStats, Element, ElementKind, Item, ObjectRef};
pub use crate::core::{Durability, Handle, Pool, PoolConfig, PoolStats, TxStore};
pub use crate::error::{ColonyError, Result};

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// A pool shared between threads; the mutex serializes transactions
pub type SharedPool = Arc<Mutex<Pool>>;

impl Pool {
    pub fn into_shared(self) -> SharedPool {
        Arc::new(Mutex::new(self))
    }
}

/// Builder for creating or opening pools
///
/// # Examples
///
/// ```rust,no_run
/// use colony_rs::{Durability, PoolBuilder};
///
/// # fn main() -> colony_rs::Result<()> {
/// let pool = PoolBuilder::new()
///     .pool_size(32 * 1024 * 1024)
///     .undo_log_size(2 * 1024 * 1024)
///     .durability(Durability::Relaxed)
///     .create("/data/big.colony")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pool size in bytes (header, log, bitmap and heap)
    pub fn pool_size(mut self, bytes: u64) -> Self {
        self.config.pool_size = bytes;
        self
    }

    pub fn undo_log_size(mut self, bytes: u64) -> Self {
        self.config.undo_log_size = bytes;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.config.durability = durability;
        self
    }

    /// Replace every setting with `config`
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Create a new pool file, replacing any file at `path`
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<Pool> {
        Pool::create(path, &self.config)
    }

    /// Open an existing pool file; size settings come from the file
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Pool> {
        Pool::open(path, self.config.durability)
    }

    pub fn open_or_create<P: AsRef<Path>>(self, path: P) -> Result<Pool> {
        Pool::open_or_create(path, &self.config)
    }

    /// Create a volatile pool backed by anonymous memory
    pub fn in_memory(self) -> Result<Pool> {
        Pool::create_in_memory(&self.config)
    }
}
