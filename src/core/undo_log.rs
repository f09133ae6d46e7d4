//! Undo log for pool transactions
//!
//! Every in-place write inside a transaction is preceded by an entry holding
//! the pre-image of the bytes about to change. Aborting (or recovering after
//! a crash) replays the entries newest-first; committing truncates the log.
//!
//! Layout of the log region:
//!
//! ```text
//! [entry_count u64][used u64][reserved 16 bytes]
//! entry: [offset u64][len u32][crc32 u32][pre-image, padded to 8 bytes]
//! ```
//!
//! An entry becomes live only when `entry_count` covers it, so a torn append
//! is never replayed.

use crate::core::header::{align_up, le_u64};
use crate::error::{ColonyError, Result};
use std::ops::Range;

/// Size of the log region header
pub const LOG_HEADER_SIZE: u64 = 32;

/// Size of an entry header
pub const ENTRY_HEADER_SIZE: u64 = 16;

/// One decoded undo record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// Pool offset the pre-image belongs to
    pub offset: u64,
    /// Length of the pre-image
    pub len: u64,
    /// Pool offset of the stored pre-image bytes
    pub data_pos: u64,
}

/// Undo log geometry within a pool mapping
#[derive(Debug, Clone, Copy)]
pub struct UndoLog {
    offset: u64,
    size: u64,
}

impl UndoLog {
    pub fn new(offset: u64, size: u64) -> Self {
        UndoLog { offset, size }
    }

    /// Bytes available for entries
    pub fn capacity(&self) -> u64 {
        self.size - LOG_HEADER_SIZE
    }

    /// The whole log region
    pub fn region(&self) -> Range<u64> {
        self.offset..self.offset + self.size
    }

    /// The log header bytes (flushed after every publish)
    pub fn header_range(&self) -> Range<u64> {
        self.offset..self.offset + LOG_HEADER_SIZE
    }

    pub fn entry_count(&self, pool: &[u8]) -> u64 {
        le_u64(pool, self.offset as usize)
    }

    pub fn used(&self, pool: &[u8]) -> u64 {
        le_u64(pool, self.offset as usize + 8)
    }

    /// Space an entry for `len` bytes occupies in the log
    pub fn entry_size(len: u64) -> u64 {
        ENTRY_HEADER_SIZE + align_up(len, 8)
    }

    /// Copy the pre-image of `pool[at..at + len]` into the next free slot
    ///
    /// The entry is not live until [`UndoLog::publish`] is called. Returns the
    /// pool range written so the caller can flush it first.
    pub fn write_entry(&self, pool: &mut [u8], at: u64, len: u64) -> Result<Range<u64>> {
        let used = self.used(pool);
        let needed = Self::entry_size(len);
        if used + needed > self.capacity() {
            return Err(ColonyError::UndoLogFull {
                needed,
                available: self.capacity() - used,
            });
        }

        let start = self.offset + LOG_HEADER_SIZE + used;
        let data_pos = (start + ENTRY_HEADER_SIZE) as usize;
        let (at_usize, len_usize) = (at as usize, len as usize);

        pool.copy_within(at_usize..at_usize + len_usize, data_pos);
        let crc = crc32fast::hash(&pool[data_pos..data_pos + len_usize]);

        let s = start as usize;
        pool[s..s + 8].copy_from_slice(&at.to_le_bytes());
        pool[s + 8..s + 12].copy_from_slice(&(len as u32).to_le_bytes());
        pool[s + 12..s + 16].copy_from_slice(&crc.to_le_bytes());

        Ok(start..start + needed)
    }

    /// Make the entry written by the last `write_entry` live
    pub fn publish(&self, pool: &mut [u8], entry_size: u64) {
        let count = self.entry_count(pool) + 1;
        let used = self.used(pool) + entry_size;
        let o = self.offset as usize;
        pool[o..o + 8].copy_from_slice(&count.to_le_bytes());
        pool[o + 8..o + 16].copy_from_slice(&used.to_le_bytes());
    }

    /// Decode and verify every live entry, oldest first
    pub fn entries(&self, pool: &[u8]) -> Result<Vec<LogEntry>> {
        let count = self.entry_count(pool);
        let used = self.used(pool);
        if used > self.capacity() {
            return Err(ColonyError::UndoLogCorrupted(format!(
                "used {} exceeds capacity {}",
                used,
                self.capacity()
            )));
        }

        let region = self.region();
        let mut entries = Vec::with_capacity(count as usize);
        let mut pos = self.offset + LOG_HEADER_SIZE;
        let end = pos + used;

        for i in 0..count {
            if pos + ENTRY_HEADER_SIZE > end {
                return Err(ColonyError::UndoLogCorrupted(format!(
                    "entry {} starts past the used area",
                    i
                )));
            }

            let p = pos as usize;
            let offset = le_u64(pool, p);
            let len = u32::from_le_bytes([pool[p + 8], pool[p + 9], pool[p + 10], pool[p + 11]]) as u64;
            let crc = u32::from_le_bytes([pool[p + 12], pool[p + 13], pool[p + 14], pool[p + 15]]);
            let data_pos = pos + ENTRY_HEADER_SIZE;

            let target_ok = offset
                .checked_add(len)
                .map(|target_end| {
                    target_end <= pool.len() as u64
                        && (target_end <= region.start || offset >= region.end)
                })
                .unwrap_or(false);
            if !target_ok || data_pos + len > end {
                return Err(ColonyError::UndoLogCorrupted(format!(
                    "entry {} targets {:#x}+{} outside the pool",
                    i, offset, len
                )));
            }

            let data = &pool[data_pos as usize..(data_pos + len) as usize];
            if crc32fast::hash(data) != crc {
                return Err(ColonyError::UndoLogCorrupted(format!(
                    "entry {} checksum mismatch",
                    i
                )));
            }

            entries.push(LogEntry {
                offset,
                len,
                data_pos,
            });
            pos += Self::entry_size(len);
        }

        Ok(entries)
    }

    /// Restore every pre-image, newest first
    ///
    /// Returns the pool ranges that were rewritten. The log itself is left
    /// intact; call [`UndoLog::truncate`] once the restored bytes are durable.
    pub fn rollback(&self, pool: &mut [u8]) -> Result<Vec<Range<u64>>> {
        let entries = self.entries(pool)?;
        let mut touched = Vec::with_capacity(entries.len());

        for entry in entries.iter().rev() {
            let src = entry.data_pos as usize;
            let len = entry.len as usize;
            pool.copy_within(src..src + len, entry.offset as usize);
            touched.push(entry.offset..entry.offset + entry.len);
        }

        Ok(touched)
    }

    /// Drop every entry
    pub fn truncate(&self, pool: &mut [u8]) {
        let o = self.offset as usize;
        pool[o..o + 16].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Vec<u8>, UndoLog) {
        // 1KB log at offset 64 inside a 4KB "pool"
        (vec![0u8; 4096], UndoLog::new(64, 1024))
    }

    fn append(log: &UndoLog, pool: &mut [u8], at: u64, len: u64) {
        let range = log.write_entry(pool, at, len).unwrap();
        log.publish(pool, range.end - range.start);
    }

    #[test]
    fn test_empty_log() {
        let (pool, log) = setup();
        assert_eq!(log.entry_count(&pool), 0);
        assert!(log.entries(&pool).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_restores_pre_images() {
        let (mut pool, log) = setup();
        pool[2000..2005].copy_from_slice(b"Hello");

        append(&log, &mut pool, 2000, 5);
        pool[2000..2005].copy_from_slice(b"World");

        let touched = log.rollback(&mut pool).unwrap();
        assert_eq!(touched, vec![2000..2005]);
        assert_eq!(&pool[2000..2005], b"Hello");
    }

    #[test]
    fn test_rollback_newest_first() {
        let (mut pool, log) = setup();
        pool[3000] = 1;

        append(&log, &mut pool, 3000, 1);
        pool[3000] = 2;
        append(&log, &mut pool, 3000, 1);
        pool[3000] = 3;

        log.rollback(&mut pool).unwrap();
        assert_eq!(pool[3000], 1);
    }

    #[test]
    fn test_unpublished_entry_ignored() {
        let (mut pool, log) = setup();
        pool[2500] = 9;

        log.write_entry(&mut pool, 2500, 1).unwrap();
        pool[2500] = 10;

        log.rollback(&mut pool).unwrap();
        assert_eq!(pool[2500], 10);
    }

    #[test]
    fn test_log_full() {
        let (mut pool, log) = setup();
        let result = log.write_entry(&mut pool, 2048, 2000);
        assert!(matches!(result, Err(ColonyError::UndoLogFull { .. })));
    }

    #[test]
    fn test_corrupted_entry_detected() {
        let (mut pool, log) = setup();
        append(&log, &mut pool, 2000, 8);

        // Flip a byte of the stored pre-image
        let data_pos = (64 + LOG_HEADER_SIZE + ENTRY_HEADER_SIZE) as usize;
        pool[data_pos] ^= 0xFF;

        assert!(matches!(
            log.entries(&pool),
            Err(ColonyError::UndoLogCorrupted(_))
        ));
    }

    #[test]
    fn test_truncate() {
        let (mut pool, log) = setup();
        append(&log, &mut pool, 2000, 8);
        append(&log, &mut pool, 2100, 3);
        assert_eq!(log.entry_count(&pool), 2);
        assert_eq!(log.used(&pool), 24 + 24);

        log.truncate(&mut pool);
        assert_eq!(log.entry_count(&pool), 0);
        assert_eq!(log.used(&pool), 0);
    }
}
