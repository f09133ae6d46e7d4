//! Persistent record layouts
//!
//! All records are little-endian `u64` fields inside pool allocations.
//! Writers go through [`ColonyField`] / [`BlockField`] so every in-place
//! update protects exactly the eight bytes it changes. Readers that need the
//! whole record take a snapshot with [`ColonyRecord::load`] /
//! [`BlockRecord::load`].
//!
//! ```text
//! colony record (128 bytes)
//!   0  name [u8; 32]          72 free_idx_count
//!  32  kind                   80 free_idx_tail
//!  40  block_capacity         88 free_block_count
//!  48  block_count            96 free_block_tail
//!  56  colony_size           104 block_table
//!  64  colony_capacity       112 block_table_cap
//!                            120 next (directory)
//!
//! block record (64 bytes)
//!   0  block_nr               32 free_next
//!   8  idx_last               40 items
//!  16  free_idx_count_block   48 jumps
//!  24  free_prev              56 links
//! ```

use crate::core::header::le_u64;
use crate::core::store::{Handle, TxStore};
use crate::core::validation::NAME_FIELD_LEN;
use crate::error::Result;

/// Absent index, block number or `idx_last` of an untouched block
pub const NONE: u64 = u64::MAX;

pub const COLONY_RECORD_SIZE: u64 = 128;
pub const BLOCK_RECORD_SIZE: u64 = 64;

/// One skipfield cell
pub const JUMP_SIZE: u64 = 8;

/// One hole-list node: `[prev u64][next u64]`, global indices
pub const LINK_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColonyField {
    Kind,
    BlockCapacity,
    BlockCount,
    ColonySize,
    ColonyCapacity,
    FreeIdxCount,
    FreeIdxTail,
    FreeBlockCount,
    FreeBlockTail,
    BlockTable,
    BlockTableCap,
    Next,
}

impl ColonyField {
    pub const fn offset(self) -> u64 {
        match self {
            ColonyField::Kind => 32,
            ColonyField::BlockCapacity => 40,
            ColonyField::BlockCount => 48,
            ColonyField::ColonySize => 56,
            ColonyField::ColonyCapacity => 64,
            ColonyField::FreeIdxCount => 72,
            ColonyField::FreeIdxTail => 80,
            ColonyField::FreeBlockCount => 88,
            ColonyField::FreeBlockTail => 96,
            ColonyField::BlockTable => 104,
            ColonyField::BlockTableCap => 112,
            ColonyField::Next => 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockField {
    BlockNr,
    IdxLast,
    FreeIdxCount,
    FreePrev,
    FreeNext,
    Items,
    Jumps,
    Links,
}

impl BlockField {
    pub const fn offset(self) -> u64 {
        match self {
            BlockField::BlockNr => 0,
            BlockField::IdxLast => 8,
            BlockField::FreeIdxCount => 16,
            BlockField::FreePrev => 24,
            BlockField::FreeNext => 32,
            BlockField::Items => 40,
            BlockField::Jumps => 48,
            BlockField::Links => 56,
        }
    }
}

pub fn read_colony<S: TxStore>(store: &S, record: Handle, field: ColonyField) -> Result<u64> {
    store.read_u64(record.offset(field.offset()))
}

pub fn write_colony<S: TxStore>(
    store: &mut S,
    record: Handle,
    field: ColonyField,
    value: u64,
) -> Result<()> {
    store.set_u64(record.offset(field.offset()), value)
}

pub fn read_block<S: TxStore>(store: &S, block: Handle, field: BlockField) -> Result<u64> {
    store.read_u64(block.offset(field.offset()))
}

pub fn write_block<S: TxStore>(
    store: &mut S,
    block: Handle,
    field: BlockField,
    value: u64,
) -> Result<()> {
    store.set_u64(block.offset(field.offset()), value)
}

/// Snapshot of a colony record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColonyRecord {
    pub name: [u8; NAME_FIELD_LEN],
    pub kind: u64,
    pub block_capacity: u64,
    pub block_count: u64,
    pub colony_size: u64,
    pub colony_capacity: u64,
    pub free_idx_count: u64,
    pub free_idx_tail: u64,
    pub free_block_count: u64,
    pub free_block_tail: u64,
    pub block_table: Handle,
    pub block_table_cap: u64,
    pub next: Handle,
}

impl ColonyRecord {
    pub fn load<S: TxStore>(store: &S, record: Handle) -> Result<Self> {
        Ok(Self::from_bytes(store.dereference(record, COLONY_RECORD_SIZE)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&bytes[..NAME_FIELD_LEN]);
        let field = |f: ColonyField| le_u64(bytes, f.offset() as usize);

        ColonyRecord {
            name,
            kind: field(ColonyField::Kind),
            block_capacity: field(ColonyField::BlockCapacity),
            block_count: field(ColonyField::BlockCount),
            colony_size: field(ColonyField::ColonySize),
            colony_capacity: field(ColonyField::ColonyCapacity),
            free_idx_count: field(ColonyField::FreeIdxCount),
            free_idx_tail: field(ColonyField::FreeIdxTail),
            free_block_count: field(ColonyField::FreeBlockCount),
            free_block_tail: field(ColonyField::FreeBlockTail),
            block_table: Handle::from_raw(field(ColonyField::BlockTable)),
            block_table_cap: field(ColonyField::BlockTableCap),
            next: Handle::from_raw(field(ColonyField::Next)),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; COLONY_RECORD_SIZE as usize];
        buf[..NAME_FIELD_LEN].copy_from_slice(&self.name);

        let fields = [
            (ColonyField::Kind, self.kind),
            (ColonyField::BlockCapacity, self.block_capacity),
            (ColonyField::BlockCount, self.block_count),
            (ColonyField::ColonySize, self.colony_size),
            (ColonyField::ColonyCapacity, self.colony_capacity),
            (ColonyField::FreeIdxCount, self.free_idx_count),
            (ColonyField::FreeIdxTail, self.free_idx_tail),
            (ColonyField::FreeBlockCount, self.free_block_count),
            (ColonyField::FreeBlockTail, self.free_block_tail),
            (ColonyField::BlockTable, self.block_table.raw()),
            (ColonyField::BlockTableCap, self.block_table_cap),
            (ColonyField::Next, self.next.raw()),
        ];
        for (field, value) in fields {
            let at = field.offset() as usize;
            buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }

        buf
    }
}

/// Snapshot of a block record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub block_nr: u64,
    pub idx_last: u64,
    pub free_idx_count: u64,
    pub free_prev: u64,
    pub free_next: u64,
    pub items: Handle,
    pub jumps: Handle,
    pub links: Handle,
}

impl BlockRecord {
    pub fn load<S: TxStore>(store: &S, block: Handle) -> Result<Self> {
        let bytes = store.dereference(block, BLOCK_RECORD_SIZE)?;
        let field = |f: BlockField| le_u64(bytes, f.offset() as usize);

        Ok(BlockRecord {
            block_nr: field(BlockField::BlockNr),
            idx_last: field(BlockField::IdxLast),
            free_idx_count: field(BlockField::FreeIdxCount),
            free_prev: field(BlockField::FreePrev),
            free_next: field(BlockField::FreeNext),
            items: Handle::from_raw(field(BlockField::Items)),
            jumps: Handle::from_raw(field(BlockField::Jumps)),
            links: Handle::from_raw(field(BlockField::Links)),
        })
    }

    /// Slots ever handed out in this block
    pub fn used_slots(&self) -> u64 {
        if self.idx_last == NONE {
            0
        } else {
            self.idx_last + 1
        }
    }
}
