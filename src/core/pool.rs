//! Memory-mapped transactional pool
//!
//! [`Pool`] is the durable store behind every colony. It implements
//! [`TxStore`] on top of a mapped file (or anonymous memory):
//!
//! - allocations come from the in-pool chunk bitmap
//! - every protected range is copied to the undo log before it changes
//! - commit flushes the mapping and truncates the log
//! - abort, and recovery on open, replay the log newest-first

use crate::colony::element::ObjectRef;
use crate::core::allocator::BitmapAllocator;
use crate::core::config::{Durability, PoolConfig};
use crate::core::header::{le_u64, PoolHeader, CHUNK_SIZE, HEADER_SIZE, ROOT_OFFSET};
use crate::core::io::PoolFile;
use crate::core::store::{Handle, TxStore};
use crate::core::undo_log::UndoLog;
use crate::error::{ColonyError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info, warn};

/// Size of the header written in front of every allocation payload
pub const ALLOC_HEADER_SIZE: u64 = 16;

const ALLOC_MAGIC: u64 = 0x434f_4c4f_4e59_414c; // "COLONYAL"

/// State of the open transaction
#[derive(Debug, Default)]
struct TxState {
    /// Ranges already logged or freshly allocated (start -> end)
    covered: BTreeMap<u64, u64>,

    /// Frees deferred to commit: (first chunk, chunk count, payload offset)
    pending_free: Vec<(u64, u64, u64)>,

    /// Number of undo entries appended
    entries: u64,
}

impl TxState {
    fn covers(&self, range: &Range<u64>) -> bool {
        self.covered
            .range(..=range.start)
            .next_back()
            .map(|(_, &end)| end >= range.end)
            .unwrap_or(false)
    }

    fn cover(&mut self, range: Range<u64>) {
        let end = self.covered.entry(range.start).or_insert(range.end);
        if *end < range.end {
            *end = range.end;
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub pool_size: u64,
    pub heap_size: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub fragmentation: f64,
    pub pool_uuid: u64,
}

/// Transactional, memory-mapped pool
#[derive(Debug)]
pub struct Pool {
    file: PoolFile,
    header: PoolHeader,
    allocator: BitmapAllocator,
    log: UndoLog,
    durability: Durability,
    tx: Option<TxState>,
    fault_after: Option<u64>,
}

impl Pool {
    /// Create a new pool file, replacing any existing file at `path`
    pub fn create<P: AsRef<Path>>(path: P, config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let header = PoolHeader::with_geometry(config.pool_size, config.undo_log_size, rand::random())?;
        let file = PoolFile::create(&path, config.pool_size)?;

        info!(
            "Creating pool {}: {} bytes, {} heap chunks",
            path.as_ref().display(),
            config.pool_size,
            header.heap_chunks
        );

        Self::format(file, header, config.durability)
    }

    /// Create a volatile pool in anonymous memory
    pub fn create_in_memory(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let header = PoolHeader::with_geometry(config.pool_size, config.undo_log_size, rand::random())?;
        let file = PoolFile::anonymous(config.pool_size)?;

        debug!("Creating in-memory pool: {} bytes", config.pool_size);

        Self::format(file, header, config.durability)
    }

    /// Open an existing pool, rolling back any transaction left open by a crash
    pub fn open<P: AsRef<Path>>(path: P, durability: Durability) -> Result<Self> {
        let file = PoolFile::open(&path)?;
        let header = PoolHeader::from_bytes(file.as_slice())?;

        if header.pool_size != file.len() {
            return Err(ColonyError::InvalidGeometry(format!(
                "header records {} bytes but file is {} bytes",
                header.pool_size,
                file.len()
            )));
        }

        let log = UndoLog::new(header.log_offset, header.log_size);
        let mut pool = Pool {
            allocator: BitmapAllocator::new(header.heap_chunks),
            file,
            header,
            log,
            durability,
            tx: None,
            fault_after: None,
        };

        let recovered = pool.recover()?;
        pool.reload_allocator();

        info!(
            "Opened pool {} ({} bytes free, {} undo entries rolled back)",
            path.as_ref().display(),
            pool.allocator.free_chunks() * CHUNK_SIZE,
            recovered
        );

        Ok(pool)
    }

    /// Open the pool at `path`, creating it with `config` if it does not exist
    pub fn open_or_create<P: AsRef<Path>>(path: P, config: &PoolConfig) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, config.durability)
        } else {
            Self::create(path, config)
        }
    }

    fn format(mut file: PoolFile, header: PoolHeader, durability: Durability) -> Result<Self> {
        file.as_mut_slice()[..HEADER_SIZE as usize].copy_from_slice(&header.to_bytes());
        file.flush()?;

        Ok(Pool {
            allocator: BitmapAllocator::new(header.heap_chunks),
            log: UndoLog::new(header.log_offset, header.log_size),
            file,
            header,
            durability,
            tx: None,
            fault_after: None,
        })
    }

    /// Roll back a transaction interrupted by a crash
    fn recover(&mut self) -> Result<u64> {
        let count = self.log.entry_count(self.file.as_slice());
        if count == 0 {
            return Ok(0);
        }

        warn!("Pool has {} pending undo entries, rolling back", count);
        self.replay_log()?;
        Ok(count)
    }

    fn replay_log(&mut self) -> Result<()> {
        let touched = self.log.rollback(self.file.as_mut_slice())?;
        for range in &touched {
            self.file.flush_range(range.start, range.end - range.start)?;
        }

        self.log.truncate(self.file.as_mut_slice());
        let header = self.log.header_range();
        self.file.flush_range(header.start, header.end - header.start)
    }

    fn reload_allocator(&mut self) {
        let bitmap = self.bitmap_range();
        self.allocator = BitmapAllocator::load(
            &self.file.as_slice()[bitmap.start as usize..bitmap.end as usize],
            self.header.heap_chunks,
        );
    }

    fn bitmap_range(&self) -> Range<u64> {
        self.header.bitmap_offset..self.header.bitmap_offset + self.header.bitmap_len()
    }

    fn heap_range(&self) -> Range<u64> {
        self.header.heap_offset..self.header.heap_offset + self.header.heap_size()
    }

    fn tx_mut(&mut self) -> Result<&mut TxState> {
        self.tx.as_mut().ok_or(ColonyError::NoActiveTransaction)
    }

    fn check_readable(&self, at: u64, len: u64) -> Result<Range<u64>> {
        match at.checked_add(len) {
            Some(end) if end <= self.header.pool_size => Ok(at..end),
            _ => Err(ColonyError::OutOfBounds { offset: at, len }),
        }
    }

    fn check_writable(&self, at: u64, len: u64) -> Result<Range<u64>> {
        let range = self.check_readable(at, len)?;
        let log = self.log.region();
        let in_header = range.start < HEADER_SIZE
            && !(range.start >= ROOT_OFFSET && range.end <= ROOT_OFFSET + 8);
        if in_header || (range.start < log.end && range.end > log.start) {
            return Err(ColonyError::OutOfBounds { offset: at, len });
        }
        Ok(range)
    }

    /// Locate the chunk run behind a payload handle
    fn allocation_of(&self, handle: Handle) -> Result<(u64, u64)> {
        let heap = self.heap_range();
        let raw = handle.raw();
        if raw < heap.start + ALLOC_HEADER_SIZE
            || raw >= heap.end
            || (raw - ALLOC_HEADER_SIZE - heap.start) % CHUNK_SIZE != 0
        {
            return Err(ColonyError::InvalidHandle(raw));
        }

        let pool = self.file.as_slice();
        let header = (raw - ALLOC_HEADER_SIZE) as usize;
        if le_u64(pool, header) != ALLOC_MAGIC {
            return Err(ColonyError::InvalidHandle(raw));
        }

        let chunks = le_u64(pool, header + 8);
        let first = (raw - ALLOC_HEADER_SIZE - heap.start) / CHUNK_SIZE;
        if chunks == 0 || first + chunks > self.header.heap_chunks {
            return Err(ColonyError::InvalidHandle(raw));
        }

        Ok((first, chunks))
    }

    /// Usable payload size of an allocation
    pub fn allocation_size(&self, handle: Handle) -> Result<u64> {
        let (_, chunks) = self.allocation_of(handle)?;
        Ok(chunks * CHUNK_SIZE - ALLOC_HEADER_SIZE)
    }

    /// Make the (n+1)-th subsequent `protect` call fail with `InjectedFault`
    pub fn inject_fault_after(&mut self, protects: u64) {
        self.fault_after = Some(protects);
    }

    pub fn clear_fault(&mut self) {
        self.fault_after = None;
    }

    /// Reference to an allocation in this pool, suitable for storing in a
    /// colony of references
    pub fn object_ref(&self, handle: Handle) -> ObjectRef {
        ObjectRef {
            pool_uuid_lo: self.header.pool_uuid,
            off: handle.raw(),
        }
    }

    pub fn uuid(&self) -> u64 {
        self.header.pool_uuid
    }

    pub fn header(&self) -> &PoolHeader {
        &self.header
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.path()
    }

    /// Undo entries appended by the open transaction
    pub fn pending_undo_entries(&self) -> u64 {
        self.tx.as_ref().map(|tx| tx.entries).unwrap_or(0)
    }

    /// Free/allocated transitions per heap chunk
    pub fn fragmentation_score(&self) -> f64 {
        let bitmap = self.bitmap_range();
        self.allocator
            .fragmentation_score(&self.file.as_slice()[bitmap.start as usize..bitmap.end as usize])
    }

    pub fn stats(&self) -> PoolStats {
        let free_bytes = self.allocator.free_chunks() * CHUNK_SIZE;
        PoolStats {
            pool_size: self.header.pool_size,
            heap_size: self.header.heap_size(),
            free_bytes,
            used_bytes: self.header.heap_size() - free_bytes,
            fragmentation: self.fragmentation_score(),
            pool_uuid: self.header.pool_uuid,
        }
    }

    /// Flush the whole mapping
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }

    /// Close the pool, aborting any open transaction
    pub fn close(mut self) -> Result<()> {
        if self.tx.is_some() {
            self.abort()?;
        }
        self.flush()
    }
}

impl TxStore for Pool {
    fn begin_transaction(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(ColonyError::TransactionInProgress);
        }
        if self.log.entry_count(self.file.as_slice()) != 0 {
            return Err(ColonyError::UndoLogCorrupted(
                "log not empty at transaction start".into(),
            ));
        }

        self.tx = Some(TxState::default());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.tx_mut()?.pending_free);

        for &(first, chunks, payload) in &pending {
            let span = BitmapAllocator::word_span(first, chunks);
            let bitmap_offset = self.header.bitmap_offset;
            self.protect(
                Handle::from_raw(bitmap_offset + span.start),
                span.end - span.start,
            )?;
            let header_at = Handle::from_raw(payload - ALLOC_HEADER_SIZE);
            self.set_u64(header_at, 0)?;

            let bitmap = self.bitmap_range();
            let bytes = &mut self.file.as_mut_slice()[bitmap.start as usize..bitmap.end as usize];
            self.allocator.mark_free(bytes, first, chunks)?;
        }

        self.file.flush()?;
        self.log.truncate(self.file.as_mut_slice());
        let header = self.log.header_range();
        self.file.flush_range(header.start, header.end - header.start)?;

        let entries = self.tx.take().map(|tx| tx.entries).unwrap_or(0);
        debug!(
            "Committed transaction: {} undo entries, {} frees",
            entries,
            pending.len()
        );
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        let entries = self.tx_mut()?.entries;

        self.replay_log()?;
        self.tx = None;
        self.reload_allocator();

        debug!("Aborted transaction: {} undo entries replayed", entries);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn protect(&mut self, at: Handle, len: u64) -> Result<()> {
        if self.tx.is_none() {
            return Err(ColonyError::NoActiveTransaction);
        }
        if len == 0 {
            return Ok(());
        }
        let range = self.check_writable(at.raw(), len)?;

        if let Some(remaining) = self.fault_after {
            if remaining == 0 {
                self.fault_after = None;
                return Err(ColonyError::InjectedFault);
            }
            self.fault_after = Some(remaining - 1);
        }

        if self.tx_mut()?.covers(&range) {
            return Ok(());
        }

        let entry = self.log.write_entry(self.file.as_mut_slice(), at.raw(), len)?;
        if self.durability == Durability::Strict {
            self.file.flush_range(entry.start, entry.end - entry.start)?;
        }

        self.log.publish(self.file.as_mut_slice(), entry.end - entry.start);
        if self.durability == Durability::Strict {
            let header = self.log.header_range();
            self.file.flush_range(header.start, header.end - header.start)?;
        }

        let tx = self.tx_mut()?;
        tx.cover(range);
        tx.entries += 1;
        Ok(())
    }

    fn allocate(&mut self, size: u64) -> Result<Handle> {
        if self.tx.is_none() {
            return Err(ColonyError::NoActiveTransaction);
        }

        let max = self.max_alloc_size();
        if size > max {
            return Err(ColonyError::AllocationTooLarge {
                requested: size,
                max,
            });
        }

        let chunks = (size.max(1) + ALLOC_HEADER_SIZE + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let bitmap = self.bitmap_range();
        let first = self.allocator.find_run(
            &self.file.as_slice()[bitmap.start as usize..bitmap.end as usize],
            chunks,
        )?;

        let span = BitmapAllocator::word_span(first, chunks);
        self.protect(
            Handle::from_raw(bitmap.start + span.start),
            span.end - span.start,
        )?;
        {
            let bytes = &mut self.file.as_mut_slice()[bitmap.start as usize..bitmap.end as usize];
            self.allocator.mark_allocated(bytes, first, chunks)?;
        }

        let start = self.header.heap_offset + first * CHUNK_SIZE;
        let end = start + chunks * CHUNK_SIZE;
        let pool = self.file.as_mut_slice();
        pool[start as usize..start as usize + 8].copy_from_slice(&ALLOC_MAGIC.to_le_bytes());
        pool[start as usize + 8..start as usize + 16].copy_from_slice(&chunks.to_le_bytes());
        pool[(start + ALLOC_HEADER_SIZE) as usize..end as usize].fill(0);

        self.tx_mut()?.cover(start..end);

        Ok(Handle::from_raw(start + ALLOC_HEADER_SIZE))
    }

    fn free(&mut self, handle: Handle) -> Result<()> {
        if self.tx.is_none() {
            return Err(ColonyError::NoActiveTransaction);
        }

        let (first, chunks) = self.allocation_of(handle)?;
        let bitmap = self.bitmap_range();
        let allocated = self.allocator.is_allocated(
            &self.file.as_slice()[bitmap.start as usize..bitmap.end as usize],
            first,
        );

        let tx = self.tx_mut()?;
        if !allocated || tx.pending_free.iter().any(|&(f, _, _)| f == first) {
            return Err(ColonyError::DoubleFree(handle.raw()));
        }
        tx.pending_free.push((first, chunks, handle.raw()));
        Ok(())
    }

    fn dereference(&self, at: Handle, len: u64) -> Result<&[u8]> {
        let range = self.check_readable(at.raw(), len)?;
        Ok(&self.file.as_slice()[range.start as usize..range.end as usize])
    }

    fn dereference_mut(&mut self, at: Handle, len: u64) -> Result<&mut [u8]> {
        if self.tx.is_none() {
            return Err(ColonyError::NoActiveTransaction);
        }
        let range = self.check_writable(at.raw(), len)?;
        Ok(&mut self.file.as_mut_slice()[range.start as usize..range.end as usize])
    }

    fn root(&self) -> Handle {
        Handle::from_raw(le_u64(self.file.as_slice(), ROOT_OFFSET as usize))
    }

    fn set_root(&mut self, root: Handle) -> Result<()> {
        self.set_u64(Handle::from_raw(ROOT_OFFSET), root.raw())
    }

    fn max_alloc_size(&self) -> u64 {
        self.header.heap_size() - ALLOC_HEADER_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> PoolConfig {
        PoolConfig {
            pool_size: 256 * 1024,
            undo_log_size: 32 * 1024,
            durability: Durability::Strict,
        }
    }

    fn memory_pool() -> Pool {
        Pool::create_in_memory(&small_config()).unwrap()
    }

    #[test]
    fn test_mutation_requires_transaction() {
        let mut pool = memory_pool();

        assert!(matches!(
            pool.allocate(64),
            Err(ColonyError::NoActiveTransaction)
        ));
        assert!(matches!(
            pool.protect(Handle::from_raw(ROOT_OFFSET), 8),
            Err(ColonyError::NoActiveTransaction)
        ));
        assert!(matches!(
            pool.set_root(Handle::NULL),
            Err(ColonyError::NoActiveTransaction)
        ));
    }

    #[test]
    fn test_nested_begin_rejected() {
        let mut pool = memory_pool();
        pool.begin_transaction().unwrap();
        assert!(matches!(
            pool.begin_transaction(),
            Err(ColonyError::TransactionInProgress)
        ));
        pool.abort().unwrap();
    }

    #[test]
    fn test_allocate_is_zeroed_and_committed() {
        let mut pool = memory_pool();
        let free_before = pool.stats().free_bytes;

        let handle = pool
            .transaction(|p| {
                let h = p.allocate(100)?;
                p.write_u64(h, 0xDEAD_BEEF)?;
                Ok(h)
            })
            .unwrap();

        assert_eq!(pool.read_u64(handle).unwrap(), 0xDEAD_BEEF);
        assert!(pool.dereference(handle.offset(8), 92).unwrap().iter().all(|&b| b == 0));
        assert_eq!(pool.allocation_size(handle).unwrap(), 2 * CHUNK_SIZE - ALLOC_HEADER_SIZE);
        assert_eq!(pool.stats().free_bytes, free_before - 2 * CHUNK_SIZE);
    }

    #[test]
    fn test_abort_releases_allocation_and_restores_bytes() {
        let mut pool = memory_pool();
        let handle = pool
            .transaction(|p| {
                let h = p.allocate(8)?;
                p.write_u64(h, 1)?;
                Ok(h)
            })
            .unwrap();
        let free_before = pool.stats().free_bytes;

        let result: Result<()> = pool.transaction(|p| {
            p.set_u64(handle, 2)?;
            p.allocate(1000)?;
            p.set_root(handle)?;
            Err(ColonyError::InjectedFault)
        });

        assert!(matches!(result, Err(ColonyError::InjectedFault)));
        assert!(!pool.in_transaction());
        assert_eq!(pool.read_u64(handle).unwrap(), 1);
        assert_eq!(pool.root(), Handle::NULL);
        assert_eq!(pool.stats().free_bytes, free_before);
    }

    #[test]
    fn test_free_deferred_to_commit() {
        let mut pool = memory_pool();
        let handle = pool.transaction(|p| p.allocate(64)).unwrap();
        let free_with_allocation = pool.stats().free_bytes;

        // An aborted free leaves the allocation in place
        let _ = pool.transaction(|p| -> Result<()> {
            p.free(handle)?;
            Err(ColonyError::InjectedFault)
        });
        assert_eq!(pool.stats().free_bytes, free_with_allocation);
        assert!(pool.allocation_size(handle).is_ok());

        pool.transaction(|p| p.free(handle)).unwrap();
        assert_eq!(pool.stats().free_bytes, free_with_allocation + 2 * CHUNK_SIZE);
        assert!(matches!(
            pool.allocation_size(handle),
            Err(ColonyError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_double_free_in_one_transaction() {
        let mut pool = memory_pool();
        let handle = pool.transaction(|p| p.allocate(8)).unwrap();

        let result = pool.transaction(|p| {
            p.free(handle)?;
            p.free(handle)
        });
        assert!(matches!(result, Err(ColonyError::DoubleFree(_))));
    }

    #[test]
    fn test_invalid_handle() {
        let mut pool = memory_pool();
        let result = pool.transaction(|p| p.free(Handle::from_raw(12345)));
        assert!(matches!(result, Err(ColonyError::InvalidHandle(_))));
    }

    #[test]
    fn test_out_of_space() {
        let mut pool = memory_pool();
        let max = pool.max_alloc_size();

        assert!(matches!(
            pool.transaction(|p| p.allocate(max + 1)),
            Err(ColonyError::AllocationTooLarge { .. })
        ));

        pool.transaction(|p| p.allocate(max / 2 + CHUNK_SIZE)).unwrap();
        assert!(matches!(
            pool.transaction(|p| p.allocate(max / 2 + CHUNK_SIZE)),
            Err(ColonyError::OutOfSpace { .. })
        ));
    }

    #[test]
    fn test_protect_rejects_log_and_header() {
        let mut pool = memory_pool();
        pool.begin_transaction().unwrap();

        let log_start = pool.header().log_offset;
        assert!(matches!(
            pool.protect(Handle::from_raw(log_start), 8),
            Err(ColonyError::OutOfBounds { .. })
        ));
        assert!(matches!(
            pool.protect(Handle::from_raw(0), 8),
            Err(ColonyError::OutOfBounds { .. })
        ));
        assert!(pool.protect(Handle::from_raw(ROOT_OFFSET), 8).is_ok());
        pool.abort().unwrap();
    }

    #[test]
    fn test_repeated_protect_logged_once() {
        let mut pool = memory_pool();
        let handle = pool.transaction(|p| p.allocate(64)).unwrap();

        pool.begin_transaction().unwrap();
        pool.protect(handle, 16).unwrap();
        pool.protect(handle, 8).unwrap();
        pool.protect(handle.offset(8), 8).unwrap();
        assert_eq!(pool.pending_undo_entries(), 1);

        // Fresh allocations are never logged
        let fresh = pool.allocate(32).unwrap();
        let after_alloc = pool.pending_undo_entries();
        pool.protect(fresh, 32).unwrap();
        assert_eq!(pool.pending_undo_entries(), after_alloc);
        pool.commit().unwrap();
    }

    #[test]
    fn test_injected_fault() {
        let mut pool = memory_pool();
        let handle = pool.transaction(|p| p.allocate(64)).unwrap();

        pool.inject_fault_after(1);
        let result = pool.transaction(|p| {
            p.set_u64(handle, 7)?;
            p.set_u64(handle.offset(8), 8)?;
            Ok(())
        });

        assert!(matches!(result, Err(ColonyError::InjectedFault)));
        assert_eq!(pool.read_u64(handle).unwrap(), 0);
        assert_eq!(pool.read_u64(handle.offset(8)).unwrap(), 0);
    }

    #[test]
    fn test_reopen_persists_committed_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.colony");

        let handle = {
            let mut pool = Pool::create(&path, &small_config()).unwrap();
            let h = pool
                .transaction(|p| {
                    let h = p.allocate(8)?;
                    p.write_u64(h, 42)?;
                    p.set_root(h)?;
                    Ok(h)
                })
                .unwrap();
            pool.close().unwrap();
            h
        };

        let pool = Pool::open(&path, Durability::Strict).unwrap();
        assert_eq!(pool.root(), handle);
        assert_eq!(pool.read_u64(handle).unwrap(), 42);
    }

    #[test]
    fn test_recovery_rolls_back_open_transaction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crash.colony");

        let (handle, free_before) = {
            let mut pool = Pool::create(&path, &small_config()).unwrap();
            let h = pool
                .transaction(|p| {
                    let h = p.allocate(8)?;
                    p.write_u64(h, 1)?;
                    p.set_root(h)?;
                    Ok(h)
                })
                .unwrap();
            let free_before = pool.stats().free_bytes;

            // Leave a transaction open and drop the pool, as a crash would
            pool.begin_transaction().unwrap();
            pool.set_u64(h, 99).unwrap();
            pool.allocate(500).unwrap();
            pool.set_root(Handle::NULL).unwrap();
            drop(pool);
            (h, free_before)
        };

        let pool = Pool::open(&path, Durability::Strict).unwrap();
        assert_eq!(pool.read_u64(handle).unwrap(), 1);
        assert_eq!(pool.root(), handle);
        assert_eq!(pool.stats().free_bytes, free_before);
    }

    #[test]
    fn test_undo_log_full_aborts() {
        let config = PoolConfig {
            pool_size: 256 * 1024,
            undo_log_size: 4096,
            durability: Durability::Relaxed,
        };
        let mut pool = Pool::create_in_memory(&config).unwrap();
        let handle = pool.transaction(|p| p.allocate(8192)).unwrap();

        let result = pool.transaction(|p| {
            let bytes = vec![0xAB; 8192];
            p.set_bytes(handle, &bytes)
        });
        assert!(matches!(result, Err(ColonyError::UndoLogFull { .. })));
        assert!(pool.dereference(handle, 8192).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_object_ref_carries_pool_identity() {
        let mut pool = memory_pool();
        let handle = pool.transaction(|p| p.allocate(8)).unwrap();
        let oid = pool.object_ref(handle);

        assert_eq!(oid.pool_uuid_lo, pool.uuid());
        assert_eq!(oid.off, handle.raw());
    }
}
