//! Durable backing store for colonies
//!
//! A pool is a single memory-mapped file holding a header, an undo log, an
//! allocation bitmap and a heap of fixed-size chunks. [`TxStore`] is the
//! interface the colony layer programs against; [`Pool`] implements it.

pub mod allocator;
pub mod config;
pub mod header;
pub mod io;
pub mod pool;
pub mod store;
pub mod undo_log;
pub mod validation;

pub use config::{Durability, PoolConfig};
pub use pool::{Pool, PoolStats};
pub use store::{Handle, TxStore};
