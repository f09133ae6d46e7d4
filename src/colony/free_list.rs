//! Hole list and free-block list
//!
//! Both lists are intrusive and LIFO at their tail.
//!
//! - The hole list threads through the per-slot link nodes of each block,
//!   keyed by global index, so a block's holes can be unlinked without a
//!   search when the block is promoted.
//! - The free-block list threads through the `free_prev` / `free_next`
//!   fields of the block records, keyed by block number.
//!
//! Promotion and demotion move a block's capacity between the two lists.
//! All functions here run inside the caller's transaction.

use crate::colony::layout::{
    read_block, write_block, BlockField, BlockRecord, ColonyField, LINK_SIZE, NONE,
};
use crate::colony::{checked_sub, Colony};
use crate::core::store::{Handle, TxStore};
use crate::error::{ColonyError, Result};
use tracing::debug;

const PREV: u64 = 0;
const NEXT: u64 = 8;

impl Colony {
    /// Link node of the hole at global index `idx`
    fn link<S: TxStore>(&self, store: &S, idx: u64) -> Result<Handle> {
        let (nr, slot) = self.locate(idx);
        let block = self.block(store, nr)?;
        let links = Handle::from_raw(read_block(store, block, BlockField::Links)?);
        Ok(links.offset(slot * LINK_SIZE))
    }

    pub(crate) fn push_hole<S: TxStore>(&self, store: &mut S, idx: u64) -> Result<()> {
        let tail = self.field(store, ColonyField::FreeIdxTail)?;
        let node = self.link(store, idx)?;
        store.set_u64(node.offset(PREV), tail)?;
        store.set_u64(node.offset(NEXT), NONE)?;

        if tail != NONE {
            let prev = self.link(store, tail)?;
            store.set_u64(prev.offset(NEXT), idx)?;
        }
        self.set_field(store, ColonyField::FreeIdxTail, idx)
    }

    /// Detach the most recently freed hole
    pub(crate) fn pop_hole<S: TxStore>(&self, store: &mut S) -> Result<Option<u64>> {
        let tail = self.field(store, ColonyField::FreeIdxTail)?;
        if tail == NONE {
            return Ok(None);
        }

        let node = self.link(store, tail)?;
        let prev = store.read_u64(node.offset(PREV))?;
        if prev != NONE {
            let prev_node = self.link(store, prev)?;
            store.set_u64(prev_node.offset(NEXT), NONE)?;
        }
        self.set_field(store, ColonyField::FreeIdxTail, prev)?;
        Ok(Some(tail))
    }

    /// Detach an arbitrary hole
    pub(crate) fn unlink_hole<S: TxStore>(&self, store: &mut S, idx: u64) -> Result<()> {
        let node = self.link(store, idx)?;
        let prev = store.read_u64(node.offset(PREV))?;
        let next = store.read_u64(node.offset(NEXT))?;

        if prev != NONE {
            let prev_node = self.link(store, prev)?;
            store.set_u64(prev_node.offset(NEXT), next)?;
        }
        if next != NONE {
            let next_node = self.link(store, next)?;
            store.set_u64(next_node.offset(PREV), prev)?;
        } else {
            self.set_field(store, ColonyField::FreeIdxTail, prev)?;
        }
        Ok(())
    }

    /// Rewrite every hole-list index through `remap`, tail first
    ///
    /// Runs before the block table is compacted, so nodes are still found
    /// by their old indices.
    pub(crate) fn remap_holes<S, F>(&self, store: &mut S, remap: F) -> Result<()>
    where
        S: TxStore,
        F: Fn(u64) -> u64,
    {
        let map = |idx: u64| if idx == NONE { NONE } else { remap(idx) };

        let tail = self.field(store, ColonyField::FreeIdxTail)?;
        let mut idx = tail;
        while idx != NONE {
            let node = self.link(store, idx)?;
            let prev = store.read_u64(node.offset(PREV))?;
            let next = store.read_u64(node.offset(NEXT))?;

            if map(prev) != prev {
                store.set_u64(node.offset(PREV), map(prev))?;
            }
            if map(next) != next {
                store.set_u64(node.offset(NEXT), map(next))?;
            }
            idx = prev;
        }

        if map(tail) != tail {
            self.set_field(store, ColonyField::FreeIdxTail, map(tail))?;
        }
        Ok(())
    }

    /// Successor of a hole-list node (towards the tail)
    pub(crate) fn hole_next<S: TxStore>(&self, store: &S, idx: u64) -> Result<u64> {
        store.read_u64(self.link(store, idx)?.offset(NEXT))
    }

    /// Hole-list indices from the tail (next to be reused) backwards
    pub fn hole_list<S: TxStore>(&self, store: &S) -> Result<Vec<u64>> {
        let limit = self.field(store, ColonyField::ColonyCapacity)?;
        let mut holes = Vec::new();
        let mut idx = self.field(store, ColonyField::FreeIdxTail)?;

        while idx != NONE {
            if holes.len() as u64 >= limit {
                return Err(ColonyError::Corrupted("hole list has a cycle".into()));
            }
            holes.push(idx);
            idx = store.read_u64(self.link(store, idx)?.offset(PREV))?;
        }
        Ok(holes)
    }

    fn push_free_block<S: TxStore>(&self, store: &mut S, nr: u64, block: Handle) -> Result<()> {
        let tail = self.field(store, ColonyField::FreeBlockTail)?;
        write_block(store, block, BlockField::FreePrev, tail)?;
        write_block(store, block, BlockField::FreeNext, NONE)?;

        if tail != NONE {
            let prev = self.block(store, tail)?;
            write_block(store, prev, BlockField::FreeNext, nr)?;
        }
        self.set_field(store, ColonyField::FreeBlockTail, nr)
    }

    fn pop_free_block<S: TxStore>(&self, store: &mut S) -> Result<Option<(u64, Handle)>> {
        let tail = self.field(store, ColonyField::FreeBlockTail)?;
        if tail == NONE {
            return Ok(None);
        }

        let block = self.block(store, tail)?;
        let prev = read_block(store, block, BlockField::FreePrev)?;
        if prev != NONE {
            let prev_block = self.block(store, prev)?;
            write_block(store, prev_block, BlockField::FreeNext, NONE)?;
        }
        write_block(store, block, BlockField::FreePrev, NONE)?;
        self.set_field(store, ColonyField::FreeBlockTail, prev)?;
        Ok(Some((tail, block)))
    }

    /// Block numbers on the free-block list from the tail backwards
    pub fn free_block_list<S: TxStore>(&self, store: &S) -> Result<Vec<u64>> {
        let limit = self.field(store, ColonyField::BlockCount)?;
        let mut blocks = Vec::new();
        let mut nr = self.field(store, ColonyField::FreeBlockTail)?;

        while nr != NONE {
            if blocks.len() as u64 >= limit {
                return Err(ColonyError::Corrupted("free-block list has a cycle".into()));
            }
            blocks.push(nr);
            nr = read_block(store, self.block(store, nr)?, BlockField::FreePrev)?;
        }
        Ok(blocks)
    }

    /// Replace the holes of a block that just lost its last element with one
    /// free-block entry
    ///
    /// `slot` is the slot whose removal emptied the block; it is already a
    /// hole in the skipfield but was never pushed on the hole list.
    pub(crate) fn promote<S: TxStore>(
        &self,
        store: &mut S,
        nr: u64,
        block: Handle,
        record: &BlockRecord,
        slot: u64,
    ) -> Result<()> {
        let base = nr * self.block_capacity;
        for other in (0..record.used_slots()).filter(|&s| s != slot) {
            self.unlink_hole(store, base + other)?;
        }

        write_block(store, block, BlockField::FreeIdxCount, 0)?;
        if record.idx_last != self.block_capacity - 1 {
            write_block(store, block, BlockField::IdxLast, self.block_capacity - 1)?;
        }

        let free_idx = self.field(store, ColonyField::FreeIdxCount)?;
        let free_blocks = self.field(store, ColonyField::FreeBlockCount)?;
        self.set_field(
            store,
            ColonyField::FreeIdxCount,
            checked_sub(free_idx, record.free_idx_count, "free_idx_count")?,
        )?;
        self.set_field(store, ColonyField::FreeBlockCount, free_blocks + 1)?;
        self.push_free_block(store, nr, block)?;

        debug!("Colony {}: block {} promoted to the free-block list", self.name, nr);
        Ok(())
    }

    /// Reuse the most recently freed block: every slot but the first goes
    /// back on the hole list, the first is left for the caller
    pub(crate) fn demote<S: TxStore>(&self, store: &mut S) -> Result<Option<(u64, Handle)>> {
        let Some((nr, block)) = self.pop_free_block(store)? else {
            return Ok(None);
        };

        let cap = self.block_capacity;
        let base = nr * cap;
        for slot in 1..cap {
            self.push_hole(store, base + slot)?;
        }
        write_block(store, block, BlockField::FreeIdxCount, cap - 1)?;

        let free_idx = self.field(store, ColonyField::FreeIdxCount)?;
        let free_blocks = self.field(store, ColonyField::FreeBlockCount)?;
        self.set_field(
            store,
            ColonyField::FreeBlockCount,
            checked_sub(free_blocks, 1, "free_block_count")?,
        )?;
        self.set_field(store, ColonyField::FreeIdxCount, free_idx + cap - 1)?;

        debug!("Colony {}: block {} demoted from the free-block list", self.name, nr);
        Ok(Some((nr, block)))
    }
}
