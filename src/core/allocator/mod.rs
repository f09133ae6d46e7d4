//! Heap allocation for pools
//!
//! The heap is carved into fixed 64-byte chunks tracked by a bitmap that
//! lives inside the pool itself, so allocator state is covered by the same
//! undo log as every other pool write:
//! - [`bitmap`] - first-fit run allocator over the in-pool bitmap

pub mod bitmap;

pub use bitmap::BitmapAllocator;
