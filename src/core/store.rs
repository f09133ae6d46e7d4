//! Transactional store interface
//!
//! The colony consumes durable memory only through [`TxStore`]: transaction
//! scoping, pre-image capture, allocation and handle resolution.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Stable reference to an allocation, valid across process restarts
///
/// Wraps the absolute pool offset of the allocation payload. Offset 0 is the
/// pool header and never a payload, so it doubles as the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(offset: u64) -> Self {
        Handle(offset)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Handle to a field `bytes` past this one
    pub const fn offset(self, bytes: u64) -> Handle {
        Handle(self.0 + bytes)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Durable, transactional memory
///
/// All mutation happens between [`begin_transaction`](TxStore::begin_transaction)
/// and [`commit`](TxStore::commit). Any in-place write to memory that was not
/// allocated in the current transaction must be preceded by a
/// [`protect`](TxStore::protect) call covering exactly the bytes about to
/// change; [`abort`](TxStore::abort) then restores every protected byte.
pub trait TxStore {
    fn begin_transaction(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn abort(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Capture the pre-image of `len` bytes at `at` for rollback
    fn protect(&mut self, at: Handle, len: u64) -> Result<()>;

    /// Allocate `size` zeroed bytes
    fn allocate(&mut self, size: u64) -> Result<Handle>;

    /// Release an allocation; takes effect when the transaction commits
    fn free(&mut self, handle: Handle) -> Result<()>;

    fn dereference(&self, at: Handle, len: u64) -> Result<&[u8]>;

    fn dereference_mut(&mut self, at: Handle, len: u64) -> Result<&mut [u8]>;

    /// Head of the pool's object directory
    fn root(&self) -> Handle;

    fn set_root(&mut self, root: Handle) -> Result<()>;

    /// Largest single allocation the store can satisfy
    fn max_alloc_size(&self) -> u64;

    fn read_u64(&self, at: Handle) -> Result<u64> {
        let bytes = self.dereference(at, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }

    /// Write without capturing a pre-image (fresh or already protected memory)
    fn write_u64(&mut self, at: Handle, value: u64) -> Result<()> {
        self.dereference_mut(at, 8)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Protect then write one word
    fn set_u64(&mut self, at: Handle, value: u64) -> Result<()> {
        self.protect(at, 8)?;
        self.write_u64(at, value)
    }

    /// Protect then overwrite `bytes.len()` bytes
    fn set_bytes(&mut self, at: Handle, bytes: &[u8]) -> Result<()> {
        self.protect(at, bytes.len() as u64)?;
        self.dereference_mut(at, bytes.len() as u64)?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Run `f` inside a transaction: commit on `Ok`, abort on `Err`
    ///
    /// Joins the enclosing transaction when one is already open, so the
    /// outermost scope decides the outcome.
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.in_transaction() {
            return f(self);
        }

        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                if let Err(err) = self.commit() {
                    if self.in_transaction() {
                        if let Err(abort_err) = self.abort() {
                            tracing::error!("Abort after failed commit failed: {}", abort_err);
                        }
                    }
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => {
                tracing::warn!("Transaction aborted: {}", err);
                if let Err(abort_err) = self.abort() {
                    tracing::error!("Abort failed: {}", abort_err);
                }
                Err(err)
            }
        }
    }
}
