//! Blocks and the block table
//!
//! A block owns four allocations: its record, an item table of
//! `block_capacity` elements, a skipfield of the same length and one
//! hole-list node per slot. Blocks are addressed by number through the block
//! table, a growable array of block handles owned by the colony record, so
//! locating the block of an index is one division and one read.

use crate::colony::layout::{
    write_block, BlockField, BlockRecord, ColonyField, BLOCK_RECORD_SIZE, JUMP_SIZE, LINK_SIZE,
    NONE,
};
use crate::colony::skipfield::{self, StoredJumps, StoredJumpsMut};
use crate::colony::Colony;
use crate::core::store::{Handle, TxStore};
use crate::error::{ColonyError, Result};
use tracing::debug;

/// Smallest block table ever allocated
const MIN_TABLE_CAPACITY: u64 = 4;

/// Width of one block table entry
const TABLE_ENTRY_SIZE: u64 = 8;

impl Colony {
    /// Block number and slot of a global index
    pub(crate) fn locate(&self, idx: u64) -> (u64, u64) {
        (idx / self.block_capacity, idx % self.block_capacity)
    }

    /// Handle of block `nr`
    pub(crate) fn block<S: TxStore>(&self, store: &S, nr: u64) -> Result<Handle> {
        let count = self.field(store, ColonyField::BlockCount)?;
        if nr >= count {
            return Err(ColonyError::Corrupted(format!(
                "block {} referenced but colony has {} blocks",
                nr, count
            )));
        }

        let table = Handle::from_raw(self.field(store, ColonyField::BlockTable)?);
        let block = Handle::from_raw(store.read_u64(table.offset(nr * TABLE_ENTRY_SIZE))?);
        if block.is_null() {
            return Err(ColonyError::Corrupted(format!("block {} has a null handle", nr)));
        }
        Ok(block)
    }

    pub(crate) fn jumps<'a, S: TxStore>(&self, store: &'a S, block: &BlockRecord) -> StoredJumps<'a, S> {
        StoredJumps::new(store, block.jumps, self.block_capacity)
    }

    pub(crate) fn jumps_mut<'a, S: TxStore>(
        &self,
        store: &'a mut S,
        block: &BlockRecord,
    ) -> StoredJumpsMut<'a, S> {
        StoredJumpsMut::new(store, block.jumps, self.block_capacity)
    }

    /// Handle of the element stored in `slot`
    pub(crate) fn item_at(&self, block: &BlockRecord, slot: u64) -> Handle {
        block.items.offset(slot * self.kind.size())
    }

    /// Allocate a block, register it as the new last block and grow the
    /// colony capacity
    pub(crate) fn append_block<S: TxStore>(&self, store: &mut S) -> Result<(u64, Handle)> {
        let nr = self.field(store, ColonyField::BlockCount)?;
        self.reserve_table(store, nr + 1)?;

        let cap = self.block_capacity;
        let block = store.allocate(BLOCK_RECORD_SIZE)?;
        let items = store.allocate(cap * self.kind.size())?;
        let jumps = store.allocate(cap * JUMP_SIZE)?;
        let links = store.allocate(cap * LINK_SIZE)?;

        for (field, value) in [
            (BlockField::BlockNr, nr),
            (BlockField::IdxLast, NONE),
            (BlockField::FreeIdxCount, 0),
            (BlockField::FreePrev, NONE),
            (BlockField::FreeNext, NONE),
            (BlockField::Items, items.raw()),
            (BlockField::Jumps, jumps.raw()),
            (BlockField::Links, links.raw()),
        ] {
            store.write_u64(block.offset(field.offset()), value)?;
        }
        skipfield::fill_holes(&mut StoredJumpsMut::new(store, jumps, cap))?;

        let table = Handle::from_raw(self.field(store, ColonyField::BlockTable)?);
        store.set_u64(table.offset(nr * TABLE_ENTRY_SIZE), block.raw())?;

        let capacity = self.field(store, ColonyField::ColonyCapacity)?;
        self.set_field(store, ColonyField::BlockCount, nr + 1)?;
        self.set_field(store, ColonyField::ColonyCapacity, capacity + cap)?;

        debug!("Colony {}: allocated block {} at {}", self.name, nr, block);
        Ok((nr, block))
    }

    /// Make room for at least `needed` entries in the block table
    fn reserve_table<S: TxStore>(&self, store: &mut S, needed: u64) -> Result<()> {
        let current = self.field(store, ColonyField::BlockTableCap)?;
        if needed <= current {
            return Ok(());
        }

        let mut grown = current.max(MIN_TABLE_CAPACITY);
        while grown < needed {
            grown *= 2;
        }

        let old = Handle::from_raw(self.field(store, ColonyField::BlockTable)?);
        let count = self.field(store, ColonyField::BlockCount)?;
        let table = store.allocate(grown * TABLE_ENTRY_SIZE)?;

        if !old.is_null() {
            let entries = store.dereference(old, count * TABLE_ENTRY_SIZE)?.to_vec();
            store
                .dereference_mut(table, count * TABLE_ENTRY_SIZE)?
                .copy_from_slice(&entries);
            store.free(old)?;
        }

        self.set_field(store, ColonyField::BlockTable, table.raw())?;
        self.set_field(store, ColonyField::BlockTableCap, grown)?;

        debug!(
            "Colony {}: block table grown from {} to {} entries",
            self.name, current, grown
        );
        Ok(())
    }

    /// Free every allocation owned by a block
    pub(crate) fn release_block<S: TxStore>(&self, store: &mut S, block: Handle) -> Result<()> {
        let record = BlockRecord::load(store, block)?;
        store.free(record.items)?;
        store.free(record.jumps)?;
        store.free(record.links)?;
        store.free(block)
    }

    /// Drop the blocks in `removed` (sorted block numbers) from the table,
    /// shifting survivors down and renumbering them
    pub(crate) fn compact_table<S: TxStore>(&self, store: &mut S, removed: &[u64]) -> Result<()> {
        let count = self.field(store, ColonyField::BlockCount)?;
        let table = Handle::from_raw(self.field(store, ColonyField::BlockTable)?);
        store.protect(table, count * TABLE_ENTRY_SIZE)?;

        let mut kept = 0;
        for nr in 0..count {
            let block = Handle::from_raw(store.read_u64(table.offset(nr * TABLE_ENTRY_SIZE))?);
            if removed.binary_search(&nr).is_ok() {
                self.release_block(store, block)?;
                continue;
            }

            if kept != nr {
                store.write_u64(table.offset(kept * TABLE_ENTRY_SIZE), block.raw())?;
                write_block(store, block, BlockField::BlockNr, kept)?;
            }
            kept += 1;
        }

        self.set_field(store, ColonyField::BlockCount, kept)?;
        self.set_field(
            store,
            ColonyField::ColonyCapacity,
            kept * self.block_capacity,
        )
    }

    /// Handles of all blocks, in block-number order
    pub(crate) fn block_handles<S: TxStore>(&self, store: &S) -> Result<Vec<Handle>> {
        let count = self.field(store, ColonyField::BlockCount)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let table = Handle::from_raw(self.field(store, ColonyField::BlockTable)?);
        (0..count)
            .map(|nr| {
                store
                    .read_u64(table.offset(nr * TABLE_ENTRY_SIZE))
                    .map(Handle::from_raw)
            })
            .collect()
    }

    /// Free the block table itself
    pub(crate) fn release_table<S: TxStore>(&self, store: &mut S) -> Result<()> {
        let table = Handle::from_raw(self.field(store, ColonyField::BlockTable)?);
        if !table.is_null() {
            store.free(table)?;
        }
        Ok(())
    }
}
