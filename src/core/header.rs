//! Pool header (page 0)
//!
//! The header occupies the first 4KB of every pool and records the geometry
//! of the regions that follow it:
//!
//! ```text
//! [0, 4096)                       header page
//! [log_offset, +log_size)         undo log
//! [bitmap_offset, heap_offset)    allocation bitmap, 1 bit per chunk
//! [heap_offset, pool_size)        heap of CHUNK_SIZE chunks
//! ```
//!
//! Everything up to the checksum is written once at creation. The `root`
//! field is the only mutable word and is updated through the undo log like
//! any other pool write.

use crate::error::{ColonyError, Result};

pub const MAGIC: [u8; 8] = *b"COLONY\x00\x01";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Size of the header page in bytes
pub const HEADER_SIZE: u64 = 4096;

/// Allocation granularity of the heap
pub const CHUNK_SIZE: u64 = 64;

/// Byte offset of the CRC32 over the immutable header fields
const CHECKSUM_OFFSET: usize = 72;

/// Byte offset of the mutable root handle
pub const ROOT_OFFSET: u64 = 80;

/// Pool header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHeader {
    /// Magic number: "COLONY\x00\x01"
    pub magic: [u8; 8],

    /// Format version (major)
    pub version_major: u16,

    /// Format version (minor)
    pub version_minor: u16,

    /// Heap chunk size in bytes (always 64)
    pub chunk_size: u32,

    /// Total pool size in bytes (equals the file length)
    pub pool_size: u64,

    /// Start of the undo log region
    pub log_offset: u64,

    /// Length of the undo log region
    pub log_size: u64,

    /// Start of the allocation bitmap
    pub bitmap_offset: u64,

    /// Start of the heap (chunk aligned)
    pub heap_offset: u64,

    /// Number of chunks in the heap
    pub heap_chunks: u64,

    /// Random pool identity, stamped into object references
    pub pool_uuid: u64,

    /// Handle of the first colony record (0 when the pool is empty)
    pub root: u64,
}

impl PoolHeader {
    /// Lay out a pool of `pool_size` bytes with an undo log of `log_size` bytes
    pub fn with_geometry(pool_size: u64, log_size: u64, pool_uuid: u64) -> Result<Self> {
        let log_offset = HEADER_SIZE;
        let bitmap_offset = log_offset
            .checked_add(log_size)
            .ok_or_else(|| ColonyError::InvalidGeometry("undo log size overflows".into()))?;

        if bitmap_offset >= pool_size {
            return Err(ColonyError::InvalidGeometry(format!(
                "undo log of {} bytes leaves no heap in a pool of {} bytes",
                log_size, pool_size
            )));
        }

        // Each chunk costs CHUNK_SIZE bytes of heap plus one bitmap bit.
        let remaining = pool_size - bitmap_offset;
        let mut heap_chunks = remaining * 8 / (CHUNK_SIZE * 8 + 1);
        let mut heap_offset = align_up(bitmap_offset + bitmap_bytes(heap_chunks), CHUNK_SIZE);
        while heap_chunks > 0 && heap_offset + heap_chunks * CHUNK_SIZE > pool_size {
            heap_chunks -= 1;
            heap_offset = align_up(bitmap_offset + bitmap_bytes(heap_chunks), CHUNK_SIZE);
        }

        if heap_chunks == 0 {
            return Err(ColonyError::InvalidGeometry(format!(
                "pool of {} bytes has no room for a heap",
                pool_size
            )));
        }

        Ok(PoolHeader {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            chunk_size: CHUNK_SIZE as u32,
            pool_size,
            log_offset,
            log_size,
            bitmap_offset,
            heap_offset,
            heap_chunks,
            pool_uuid,
            root: 0,
        })
    }

    /// Heap size in bytes
    pub fn heap_size(&self) -> u64 {
        self.heap_chunks * CHUNK_SIZE
    }

    /// Length of the bitmap region in bytes (whole u64 words)
    pub fn bitmap_len(&self) -> u64 {
        bitmap_bytes(self.heap_chunks)
    }

    /// Validate magic, version and region geometry
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ColonyError::InvalidMagic);
        }

        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(ColonyError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.chunk_size as u64 != CHUNK_SIZE {
            return Err(ColonyError::InvalidGeometry(format!(
                "chunk size {} (expected {})",
                self.chunk_size, CHUNK_SIZE
            )));
        }

        let ordered = self.log_offset == HEADER_SIZE
            && self.log_offset + self.log_size == self.bitmap_offset
            && self.bitmap_offset + self.bitmap_len() <= self.heap_offset
            && self.heap_offset % CHUNK_SIZE == 0
            && self.heap_offset + self.heap_size() <= self.pool_size;
        if !ordered {
            return Err(ColonyError::InvalidGeometry(format!(
                "regions out of order: log {}+{}, bitmap {}, heap {}+{} chunks, pool {}",
                self.log_offset,
                self.log_size,
                self.bitmap_offset,
                self.heap_offset,
                self.heap_chunks,
                self.pool_size
            )));
        }

        if self.root != 0 && (self.root < self.heap_offset || self.root >= self.pool_size) {
            return Err(ColonyError::InvalidHandle(self.root));
        }

        Ok(())
    }

    /// Serialize header to bytes (one full header page)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE as usize);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.chunk_size.to_le_bytes());
        bytes.extend_from_slice(&self.pool_size.to_le_bytes());
        bytes.extend_from_slice(&self.log_offset.to_le_bytes());
        bytes.extend_from_slice(&self.log_size.to_le_bytes());
        bytes.extend_from_slice(&self.bitmap_offset.to_le_bytes());
        bytes.extend_from_slice(&self.heap_offset.to_le_bytes());
        bytes.extend_from_slice(&self.heap_chunks.to_le_bytes());
        bytes.extend_from_slice(&self.pool_uuid.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&self.root.to_le_bytes());

        // Pad to HEADER_SIZE
        bytes.resize(HEADER_SIZE as usize, 0);

        bytes
    }

    /// Deserialize and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(ColonyError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for pool header",
            )));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        if magic != MAGIC {
            return Err(ColonyError::InvalidMagic);
        }

        let stored = u32::from_le_bytes([
            bytes[CHECKSUM_OFFSET],
            bytes[CHECKSUM_OFFSET + 1],
            bytes[CHECKSUM_OFFSET + 2],
            bytes[CHECKSUM_OFFSET + 3],
        ]);
        if crc32fast::hash(&bytes[..CHECKSUM_OFFSET]) != stored {
            return Err(ColonyError::HeaderChecksumMismatch);
        }

        let header = PoolHeader {
            magic,
            version_major: u16::from_le_bytes([bytes[8], bytes[9]]),
            version_minor: u16::from_le_bytes([bytes[10], bytes[11]]),
            chunk_size: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            pool_size: le_u64(bytes, 16),
            log_offset: le_u64(bytes, 24),
            log_size: le_u64(bytes, 32),
            bitmap_offset: le_u64(bytes, 40),
            heap_offset: le_u64(bytes, 48),
            heap_chunks: le_u64(bytes, 56),
            pool_uuid: le_u64(bytes, 64),
            root: le_u64(bytes, ROOT_OFFSET as usize),
        };

        header.validate()?;

        Ok(header)
    }
}

pub(crate) fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(word)
}

fn bitmap_bytes(chunks: u64) -> u64 {
    (chunks + 63) / 64 * 8
}

pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) / align * align
}
