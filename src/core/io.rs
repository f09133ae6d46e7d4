//! Memory-mapped storage for pools

use crate::error::{ColonyError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Mapped pool storage
///
/// Either backed by a file (durable) or anonymous memory (volatile, used for
/// tests and benchmarks). Flushes on anonymous storage are no-ops.
pub struct PoolFile {
    map: MmapMut,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl PoolFile {
    /// Create (or truncate) a pool file of `size` bytes and map it
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(size)?;

        // SAFETY: the file was just created by us and is not truncated while mapped.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(PoolFile {
            map,
            file: Some(file),
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Open and map an existing pool file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(ColonyError::InvalidGeometry(format!(
                "pool file {} is empty",
                path.as_ref().display()
            )));
        }

        // SAFETY: the pool owns the mapping for its lifetime; external truncation
        // of a pool file while it is open is unsupported.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(PoolFile {
            map,
            file: Some(file),
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Map `size` bytes of anonymous, zeroed memory
    pub fn anonymous(size: u64) -> Result<Self> {
        let map = MmapOptions::new().len(size as usize).map_anon()?;

        Ok(PoolFile {
            map,
            file: None,
            path: None,
        })
    }

    /// Length of the mapping
    pub fn len(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// File path, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.file.is_some()
    }

    /// Flush a byte range to the backing file
    pub fn flush_range(&self, offset: u64, len: u64) -> Result<()> {
        if self.file.is_none() || len == 0 {
            return Ok(());
        }
        self.map.flush_range(offset as usize, len as usize)?;
        Ok(())
    }

    /// Flush the whole mapping to the backing file
    pub fn flush(&self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.map.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for PoolFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFile")
            .field("len", &self.map.len())
            .field("path", &self.path)
            .finish()
    }
}
