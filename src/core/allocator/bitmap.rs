//! Bitmap allocator for heap chunks
//!
//! Each bit represents one 64-byte chunk of the heap. The bitmap words are
//! stored in the pool mapping; this type only carries the geometry and a
//! cached free count, and is handed the bitmap bytes for every operation so
//! the pool can protect the touched words before they change.

use crate::error::{ColonyError, Result};
use std::ops::Range;

/// Bitmap allocator for heap chunks
///
/// Represents free/allocated state with bits:
/// - 0 = free chunk
/// - 1 = allocated chunk
#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    /// Total number of chunks tracked
    total_chunks: u64,

    /// Number of free chunks available
    free_chunks: u64,
}

impl BitmapAllocator {
    /// Create an allocator for an all-free bitmap
    pub fn new(total_chunks: u64) -> Self {
        BitmapAllocator {
            total_chunks,
            free_chunks: total_chunks,
        }
    }

    /// Rebuild the free count from an existing bitmap
    pub fn load(bitmap: &[u8], total_chunks: u64) -> Self {
        let words = ((total_chunks + 63) / 64) as usize;
        let allocated: u64 = (0..words)
            .map(|i| word_at(bitmap, i).count_ones() as u64)
            .sum();

        BitmapAllocator {
            total_chunks,
            free_chunks: total_chunks.saturating_sub(allocated),
        }
    }

    /// Find the first run of `chunks` free chunks
    pub fn find_run(&self, bitmap: &[u8], chunks: u64) -> Result<u64> {
        let wanted = chunks.max(1);
        if wanted > self.free_chunks {
            return Err(ColonyError::OutOfSpace {
                requested: wanted * crate::core::header::CHUNK_SIZE,
            });
        }

        let mut run_start = 0u64;
        let mut run_len = 0u64;
        let mut chunk = 0u64;

        while chunk < self.total_chunks {
            let word = word_at(bitmap, (chunk / 64) as usize);

            if chunk % 64 == 0 && word == u64::MAX {
                run_len = 0; // Whole word allocated
                chunk += 64;
                continue;
            }

            if chunk % 64 == 0 && word == 0 {
                if run_len == 0 {
                    run_start = chunk;
                }
                let span = 64.min(self.total_chunks - chunk);
                if run_len + span >= wanted {
                    return Ok(run_start);
                }
                run_len += span;
                chunk += span;
                continue;
            }

            if word & (1u64 << (chunk % 64)) == 0 {
                if run_len == 0 {
                    run_start = chunk;
                }
                run_len += 1;
                if run_len == wanted {
                    return Ok(run_start);
                }
            } else {
                run_len = 0;
            }
            chunk += 1;
        }

        Err(ColonyError::OutOfSpace {
            requested: wanted * crate::core::header::CHUNK_SIZE,
        })
    }

    /// Byte range of the bitmap words covering chunks `start..start + chunks`
    pub fn word_span(start: u64, chunks: u64) -> Range<u64> {
        let first = start / 64;
        let last = (start + chunks.max(1) - 1) / 64;
        first * 8..(last + 1) * 8
    }

    /// Mark a run as allocated; every chunk must currently be free
    pub fn mark_allocated(&mut self, bitmap: &mut [u8], start: u64, chunks: u64) -> Result<()> {
        self.check_run(start, chunks)?;
        if (start..start + chunks).any(|c| is_set(bitmap, c)) {
            return Err(ColonyError::Corrupted(format!(
                "chunk run {}+{} is already allocated",
                start, chunks
            )));
        }

        for c in start..start + chunks {
            set_bit(bitmap, c, true);
        }
        self.free_chunks -= chunks;
        Ok(())
    }

    /// Mark a run as free; every chunk must currently be allocated
    pub fn mark_free(&mut self, bitmap: &mut [u8], start: u64, chunks: u64) -> Result<()> {
        self.check_run(start, chunks)?;
        if (start..start + chunks).any(|c| !is_set(bitmap, c)) {
            return Err(ColonyError::DoubleFree(start));
        }

        for c in start..start + chunks {
            set_bit(bitmap, c, false);
        }
        self.free_chunks += chunks;
        Ok(())
    }

    /// Check if a specific chunk is allocated
    pub fn is_allocated(&self, bitmap: &[u8], chunk: u64) -> bool {
        chunk < self.total_chunks && is_set(bitmap, chunk)
    }

    /// Fragmentation score: free/allocated transitions per chunk
    ///
    /// 0.0 for an empty or completely full heap, higher when allocations are
    /// scattered.
    pub fn fragmentation_score(&self, bitmap: &[u8]) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }

        let mut transitions = 0u64;
        let mut prev_allocated = false;
        for chunk in 0..self.total_chunks {
            let allocated = is_set(bitmap, chunk);
            if allocated != prev_allocated {
                transitions += 1;
            }
            prev_allocated = allocated;
        }

        transitions as f64 / self.total_chunks as f64
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn free_chunks(&self) -> u64 {
        self.free_chunks
    }

    fn check_run(&self, start: u64, chunks: u64) -> Result<()> {
        if chunks == 0 || start + chunks > self.total_chunks {
            return Err(ColonyError::InvalidHandle(start));
        }
        Ok(())
    }
}

fn word_at(bitmap: &[u8], word_idx: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bitmap[word_idx * 8..word_idx * 8 + 8]);
    u64::from_le_bytes(word)
}

fn is_set(bitmap: &[u8], chunk: u64) -> bool {
    bitmap[(chunk / 8) as usize] & (1u8 << (chunk % 8)) != 0
}

fn set_bit(bitmap: &mut [u8], chunk: u64, value: bool) {
    let byte = &mut bitmap[(chunk / 8) as usize];
    if value {
        *byte |= 1u8 << (chunk % 8);
    } else {
        *byte &= !(1u8 << (chunk % 8));
    }
}
