//! Segmented colony container
//!
//! A colony stores fixed-width elements in blocks of `block_capacity`
//! slots and hands out stable global indices (`block_nr * block_capacity +
//! slot`). Removed slots are recycled through two LIFO lists: single holes
//! inside blocks that still hold elements, and whole blocks that hold none.
//! Each block's skipfield lets a scan hop over a run of holes in one step.
//!
//! Every mutating call is one transaction on the backing [`TxStore`]: after
//! an error the colony is exactly as it was before the call.
//!
//! ```
//! use colony_rs::colony::{Colony, ElementKind};
//! use colony_rs::core::{Pool, PoolConfig};
//!
//! let mut pool = Pool::create_in_memory(&PoolConfig::default()).unwrap();
//! let colony = Colony::create(&mut pool, "numbers", ElementKind::Int, 4).unwrap();
//!
//! let a = colony.insert(&mut pool, 10i32).unwrap();
//! let b = colony.insert(&mut pool, 20i32).unwrap();
//! colony.remove(&mut pool, a).unwrap();
//!
//! // The freed slot is reused first
//! assert_eq!(colony.insert(&mut pool, 30i32).unwrap(), a);
//! assert_eq!(colony.get(&pool, b).unwrap().as_int(), Some(20));
//! ```

mod block;
pub mod directory;
pub mod element;
mod free_list;
pub mod layout;
pub mod skipfield;

pub use element::{Element, ElementKind, Item, ObjectRef};

use crate::colony::layout::{
    read_block, read_colony, write_block, write_colony, BlockField, BlockRecord, ColonyField,
    ColonyRecord, COLONY_RECORD_SIZE, LINK_SIZE, NONE,
};
use crate::colony::skipfield::JumpRead;
use crate::core::store::{Handle, TxStore};
use crate::core::validation::ColonyName;
use crate::error::{ColonyError, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::info;

/// Handle to a colony record in a store
///
/// Cheap to clone. The handle caches only immutable properties; all
/// counters are read from the store on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colony {
    name: ColonyName,
    record: Handle,
    kind: ElementKind,
    block_capacity: u64,
}

/// Counters of one colony
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColonyStats {
    pub name: String,
    pub kind: ElementKind,
    pub block_capacity: u64,
    pub block_count: u64,
    pub colony_size: u64,
    pub colony_capacity: u64,
    pub free_idx_count: u64,
    pub free_block_count: u64,
}

impl fmt::Display for ColonyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "colony: block_capacity: {}", self.block_capacity)?;
        writeln!(f, "colony: block_count: {}", self.block_count)?;
        writeln!(f, "colony: colony_size: {}", self.colony_size)?;
        writeln!(f, "colony: colony_capacity: {}", self.colony_capacity)?;
        writeln!(f, "colony: free_idx_count: {}", self.free_idx_count)?;
        write!(f, "colony: free_block_count: {}", self.free_block_count)
    }
}

pub(crate) fn checked_sub(value: u64, by: u64, counter: &str) -> Result<u64> {
    value
        .checked_sub(by)
        .ok_or_else(|| ColonyError::Corrupted(format!("{} would underflow", counter)))
}

impl Colony {
    /// Create an empty colony and link it into the store's directory
    ///
    /// # Errors
    ///
    /// All of these are returned before any transaction starts:
    /// - `InvalidColonyName` for names outside `[A-Za-z0-9_.-]{1,29}`
    /// - `InvalidBlockCapacity` for a zero capacity
    /// - `BlockCapacityTooLarge` when one block's allocations cannot fit
    /// - `ColonyExists` when the name is taken
    pub fn create<S: TxStore>(
        store: &mut S,
        name: &str,
        kind: ElementKind,
        block_capacity: u64,
    ) -> Result<Colony> {
        let name = ColonyName::new(name)?;
        if block_capacity == 0 {
            return Err(ColonyError::InvalidBlockCapacity(block_capacity));
        }

        let max = store.max_alloc_size();
        let widest = LINK_SIZE.max(kind.size());
        if !matches!(block_capacity.checked_mul(widest), Some(bytes) if bytes <= max) {
            return Err(ColonyError::BlockCapacityTooLarge {
                capacity: block_capacity,
                max,
            });
        }

        if directory::find(store, &name)?.is_some() {
            return Err(ColonyError::ColonyExists(name.into_string()));
        }

        let initial = ColonyRecord {
            name: name.to_field(),
            kind: kind.tag(),
            block_capacity,
            block_count: 0,
            colony_size: 0,
            colony_capacity: 0,
            free_idx_count: 0,
            free_idx_tail: NONE,
            free_block_count: 0,
            free_block_tail: NONE,
            block_table: Handle::NULL,
            block_table_cap: 0,
            next: Handle::NULL,
        };

        let record = store.transaction(|s| {
            let record = s.allocate(COLONY_RECORD_SIZE)?;
            s.dereference_mut(record, COLONY_RECORD_SIZE)?
                .copy_from_slice(&initial.to_bytes());
            directory::link(s, record)?;
            Ok(record)
        })?;

        info!(
            "Created colony {} ({}, block capacity {})",
            name, kind, block_capacity
        );

        Ok(Colony {
            name,
            record,
            kind,
            block_capacity,
        })
    }

    /// Open an existing colony by name
    pub fn open<S: TxStore>(store: &S, name: &str) -> Result<Colony> {
        let name = ColonyName::new(name)?;
        let record = directory::find(store, &name)?
            .ok_or_else(|| ColonyError::ColonyNotFound(name.to_string()))?;
        Self::from_record(store, record)
    }

    /// Statistics of every colony in the store
    pub fn list<S: TxStore>(store: &S) -> Result<Vec<ColonyStats>> {
        directory::records(store)?
            .into_iter()
            .map(|record| Self::from_record(store, record).and_then(|c| c.stats(store)))
            .collect()
    }

    fn from_record<S: TxStore>(store: &S, record: Handle) -> Result<Colony> {
        let snapshot = ColonyRecord::load(store, record)?;
        let name = ColonyName::from_field(&snapshot.name)?;
        let kind = ElementKind::from_tag(snapshot.kind)?;
        if snapshot.block_capacity == 0 {
            return Err(ColonyError::Corrupted(format!(
                "colony {} has zero block capacity",
                name
            )));
        }

        Ok(Colony {
            name,
            record,
            kind,
            block_capacity: snapshot.block_capacity,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn block_capacity(&self) -> u64 {
        self.block_capacity
    }

    /// Handle of the colony record
    pub fn record(&self) -> Handle {
        self.record
    }

    /// Whether this handle's record is still in the store's directory under
    /// its name
    pub fn is_linked<S: TxStore>(&self, store: &S) -> Result<bool> {
        Ok(directory::find(store, &self.name)? == Some(self.record))
    }

    pub(crate) fn field<S: TxStore>(&self, store: &S, field: ColonyField) -> Result<u64> {
        read_colony(store, self.record, field)
    }

    pub(crate) fn set_field<S: TxStore>(
        &self,
        store: &mut S,
        field: ColonyField,
        value: u64,
    ) -> Result<()> {
        write_colony(store, self.record, field, value)
    }

    /// Number of live elements
    pub fn len<S: TxStore>(&self, store: &S) -> Result<u64> {
        self.field(store, ColonyField::ColonySize)
    }

    pub fn is_empty<S: TxStore>(&self, store: &S) -> Result<bool> {
        Ok(self.len(store)? == 0)
    }

    /// Insert a typed element, returning its index
    pub fn insert<S: TxStore, E: Element>(&self, store: &mut S, item: E) -> Result<u64> {
        self.insert_item(store, item.into_item())
    }

    /// Insert an element of either kind, returning its index
    ///
    /// Slot choice, in order: the most recently freed hole, the first slot
    /// of the most recently freed block, the next never-used slot of the
    /// last block, the first slot of a new block.
    pub fn insert_item<S: TxStore>(&self, store: &mut S, item: Item) -> Result<u64> {
        if item.kind() != self.kind {
            return Err(ColonyError::WrongElementKind {
                expected: self.kind,
                found: item.kind(),
            });
        }

        store.transaction(|s| self.insert_in_tx(s, &item))
    }

    fn insert_in_tx<S: TxStore>(&self, store: &mut S, item: &Item) -> Result<u64> {
        let (nr, block, slot) = if let Some(idx) = self.pop_hole(store)? {
            let (nr, slot) = self.locate(idx);
            let block = self.block(store, nr)?;
            let holes = read_block(store, block, BlockField::FreeIdxCount)?;
            write_block(
                store,
                block,
                BlockField::FreeIdxCount,
                checked_sub(holes, 1, "block hole count")?,
            )?;
            let free_idx = self.field(store, ColonyField::FreeIdxCount)?;
            self.set_field(
                store,
                ColonyField::FreeIdxCount,
                checked_sub(free_idx, 1, "free_idx_count")?,
            )?;
            (nr, block, slot)
        } else if let Some((nr, block)) = self.demote(store)? {
            (nr, block, 0)
        } else {
            let (nr, block) = match self.tail_with_room(store)? {
                Some(tail) => tail,
                None => self.append_block(store)?,
            };
            let slot = read_block(store, block, BlockField::IdxLast)?.wrapping_add(1);
            write_block(store, block, BlockField::IdxLast, slot)?;
            (nr, block, slot)
        };

        let record = BlockRecord::load(store, block)?;
        let width = self.kind.size() as usize;
        let mut bytes = [0u8; 16];
        item.encode(&mut bytes[..width]);
        store.set_bytes(self.item_at(&record, slot), &bytes[..width])?;
        skipfield::mark_live(&mut self.jumps_mut(store, &record), slot)?;

        let size = self.field(store, ColonyField::ColonySize)?;
        self.set_field(store, ColonyField::ColonySize, size + 1)?;

        Ok(nr * self.block_capacity + slot)
    }

    /// Last block, if it still has never-used slots
    fn tail_with_room<S: TxStore>(&self, store: &S) -> Result<Option<(u64, Handle)>> {
        let count = self.field(store, ColonyField::BlockCount)?;
        if count == 0 {
            return Ok(None);
        }

        let nr = count - 1;
        let block = self.block(store, nr)?;
        let used = read_block(store, block, BlockField::IdxLast)?.wrapping_add(1);
        Ok((used < self.block_capacity).then_some((nr, block)))
    }

    /// Validate that `idx` holds a live element
    fn check_live<S: TxStore>(&self, store: &S, idx: u64) -> Result<(BlockRecord, u64)> {
        let capacity = self.field(store, ColonyField::ColonyCapacity)?;
        if idx >= capacity {
            return Err(ColonyError::IndexOutOfRange {
                index: idx,
                capacity,
            });
        }

        let (nr, slot) = self.locate(idx);
        let record = BlockRecord::load(store, self.block(store, nr)?)?;
        if self.jumps(store, &record).jump(slot)? != 0 {
            return Err(ColonyError::NotPresent(idx));
        }
        Ok((record, slot))
    }

    /// Remove the element at `idx`
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` and `NotPresent` are reported before any
    /// transaction starts.
    pub fn remove<S: TxStore>(&self, store: &mut S, idx: u64) -> Result<()> {
        self.check_live(store, idx)?;
        store.transaction(|s| self.remove_in_tx(s, idx))
    }

    fn remove_in_tx<S: TxStore>(&self, store: &mut S, idx: u64) -> Result<()> {
        let (nr, slot) = self.locate(idx);
        let block = self.block(store, nr)?;
        let record = BlockRecord::load(store, block)?;

        skipfield::mark_hole(&mut self.jumps_mut(store, &record), slot)?;

        if record.free_idx_count + 1 == record.used_slots() {
            self.promote(store, nr, block, &record, slot)?;
        } else {
            self.push_hole(store, idx)?;
            write_block(
                store,
                block,
                BlockField::FreeIdxCount,
                record.free_idx_count + 1,
            )?;
            let free_idx = self.field(store, ColonyField::FreeIdxCount)?;
            self.set_field(store, ColonyField::FreeIdxCount, free_idx + 1)?;
        }

        let size = self.field(store, ColonyField::ColonySize)?;
        self.set_field(
            store,
            ColonyField::ColonySize,
            checked_sub(size, 1, "colony_size")?,
        )
    }

    /// Remove every live element with an index in `from..=to`
    ///
    /// Holes inside the range are skipped. Returns the number removed.
    pub fn remove_range<S: TxStore>(&self, store: &mut S, from: u64, to: u64) -> Result<u64> {
        if from > to {
            return Err(ColonyError::InvalidRange { from, to });
        }
        let capacity = self.field(store, ColonyField::ColonyCapacity)?;
        if to >= capacity {
            return Err(ColonyError::IndexOutOfRange {
                index: to,
                capacity,
            });
        }

        store.transaction(|s| {
            let live = self.live_between(s, from, to)?;
            for &idx in &live {
                self.remove_in_tx(s, idx)?;
            }
            Ok(live.len() as u64)
        })
    }

    fn live_between<S: TxStore>(&self, store: &S, from: u64, to: u64) -> Result<Vec<u64>> {
        let cap = self.block_capacity;
        let mut live = Vec::new();

        for nr in from / cap..=to / cap {
            let record = BlockRecord::load(store, self.block(store, nr)?)?;
            let jumps = self.jumps(store, &record);
            for slot in skipfield::live_slots(&jumps) {
                let idx = nr * cap + slot?;
                if idx > to {
                    break;
                }
                if idx >= from {
                    live.push(idx);
                }
            }
        }
        Ok(live)
    }

    /// Release every block on the free-block list
    ///
    /// Blocks after a released one move down, so indices above a released
    /// block's range shrink by `block_capacity` for each released block
    /// below them; hole-list entries are rewritten to match. Returns the
    /// number of blocks released.
    pub fn delete_free_blocks<S: TxStore>(&self, store: &mut S) -> Result<u64> {
        if self.field(store, ColonyField::FreeBlockCount)? == 0 {
            return Ok(0);
        }

        let released = store.transaction(|s| {
            let mut removed = self.free_block_list(s)?;
            removed.sort_unstable();

            let cap = self.block_capacity;
            self.remap_holes(s, |idx| {
                idx - cap * removed.partition_point(|&nr| nr < idx / cap) as u64
            })?;
            self.compact_table(s, &removed)?;

            self.set_field(s, ColonyField::FreeBlockCount, 0)?;
            self.set_field(s, ColonyField::FreeBlockTail, NONE)?;
            Ok(removed.len() as u64)
        })?;

        info!("Colony {}: released {} free blocks", self.name, released);
        Ok(released)
    }

    /// Free the colony and everything it owns, and drop it from the directory
    ///
    /// Consumes this handle only. Clones of it still point at the freed
    /// record, which a later allocation may reuse; check
    /// [`Colony::is_linked`] or re-[`open`](Colony::open) by name before
    /// using a handle that may have outlived a delete.
    pub fn delete<S: TxStore>(self, store: &mut S) -> Result<()> {
        store.transaction(|s| {
            for block in self.block_handles(s)? {
                self.release_block(s, block)?;
            }
            self.release_table(s)?;
            directory::unlink(s, self.record)?;
            s.free(self.record)
        })?;

        info!("Deleted colony {}", self.name);
        Ok(())
    }

    /// Element at `idx`
    pub fn get<S: TxStore>(&self, store: &S, idx: u64) -> Result<Item> {
        let (record, slot) = self.check_live(store, idx)?;
        let bytes = store.dereference(self.item_at(&record, slot), self.kind.size())?;
        Ok(Item::decode(self.kind, bytes))
    }

    /// Every live element with its index, in index order
    pub fn entries<S: TxStore>(&self, store: &S) -> Result<Vec<(u64, Item)>> {
        let cap = self.block_capacity;
        let mut entries = Vec::with_capacity(self.len(store)? as usize);

        for (nr, block) in self.block_handles(store)?.into_iter().enumerate() {
            let record = BlockRecord::load(store, block)?;
            let jumps = self.jumps(store, &record);
            for slot in skipfield::live_slots(&jumps) {
                let slot = slot?;
                let bytes = store.dereference(self.item_at(&record, slot), self.kind.size())?;
                entries.push((nr as u64 * cap + slot, Item::decode(self.kind, bytes)));
            }
        }
        Ok(entries)
    }

    pub fn stats<S: TxStore>(&self, store: &S) -> Result<ColonyStats> {
        let record = ColonyRecord::load(store, self.record)?;
        Ok(ColonyStats {
            name: self.name.to_string(),
            kind: self.kind,
            block_capacity: record.block_capacity,
            block_count: record.block_count,
            colony_size: record.colony_size,
            colony_capacity: record.colony_capacity,
            free_idx_count: record.free_idx_count,
            free_block_count: record.free_block_count,
        })
    }

    /// Raw skipfield cells of block `nr`
    pub fn skipfield<S: TxStore>(&self, store: &S, nr: u64) -> Result<Vec<u64>> {
        let record = BlockRecord::load(store, self.block(store, nr)?)?;
        let jumps = self.jumps(store, &record);
        (0..self.block_capacity).map(|slot| jumps.jump(slot)).collect()
    }

    /// Cross-check every counter, list and skipfield of the colony
    ///
    /// Besides the per-structure checks this verifies
    /// `colony_size + free_idx_count + free_block_count * block_capacity +
    /// unused == colony_capacity`, where `unused` counts the never-used slots
    /// at the end of the last block.
    pub fn check_integrity<S: TxStore>(&self, store: &S) -> Result<()> {
        let corrupt = |msg: String| ColonyError::Corrupted(format!("colony {}: {}", self.name, msg));
        let rec = ColonyRecord::load(store, self.record)?;
        let cap = self.block_capacity;

        if rec.block_capacity != cap || rec.kind != self.kind.tag() {
            return Err(corrupt("record does not match handle".into()));
        }
        if rec.colony_capacity != cap * rec.block_count {
            return Err(corrupt(format!(
                "capacity {} != {} blocks * {}",
                rec.colony_capacity, rec.block_count, cap
            )));
        }
        if rec.block_count > rec.block_table_cap {
            return Err(corrupt("block table smaller than block count".into()));
        }

        // free-block list
        let free_blocks = self.free_block_list(store)?;
        if free_blocks.len() as u64 != rec.free_block_count {
            return Err(corrupt(format!(
                "free-block list has {} entries, counter says {}",
                free_blocks.len(),
                rec.free_block_count
            )));
        }
        let free_set: HashSet<u64> = free_blocks.iter().copied().collect();
        if free_set.len() != free_blocks.len() {
            return Err(corrupt("free-block list repeats a block".into()));
        }
        let mut newer = NONE;
        for &nr in &free_blocks {
            let next = read_block(store, self.block(store, nr)?, BlockField::FreeNext)?;
            if next != newer {
                return Err(corrupt(format!("free-block {} has a bad next link", nr)));
            }
            newer = nr;
        }

        // hole list
        let holes = self.hole_list(store)?;
        if holes.len() as u64 != rec.free_idx_count {
            return Err(corrupt(format!(
                "hole list has {} entries, counter says {}",
                holes.len(),
                rec.free_idx_count
            )));
        }
        let mut holes_per_block: HashMap<u64, u64> = HashMap::new();
        let mut seen = HashSet::new();
        let mut newer = NONE;
        for &idx in &holes {
            if !seen.insert(idx) {
                return Err(corrupt(format!("hole {} listed twice", idx)));
            }
            if idx >= rec.colony_capacity {
                return Err(corrupt(format!("hole {} beyond capacity", idx)));
            }
            if self.hole_next(store, idx)? != newer {
                return Err(corrupt(format!("hole {} has a bad next link", idx)));
            }
            newer = idx;

            let (nr, slot) = self.locate(idx);
            if free_set.contains(&nr) {
                return Err(corrupt(format!("hole {} lies in free block {}", idx, nr)));
            }
            let record = BlockRecord::load(store, self.block(store, nr)?)?;
            if slot >= record.used_slots() || self.jumps(store, &record).jump(slot)? == 0 {
                return Err(corrupt(format!("hole {} is not a used hole slot", idx)));
            }
            *holes_per_block.entry(nr).or_default() += 1;
        }

        // blocks
        let mut live_total = 0;
        let mut unused = 0;
        for (nr, block) in self.block_handles(store)?.into_iter().enumerate() {
            let nr = nr as u64;
            let record = BlockRecord::load(store, block)?;
            if record.block_nr != nr {
                return Err(corrupt(format!("block {} records number {}", nr, record.block_nr)));
            }

            let jumps = self.jumps(store, &record);
            let live = skipfield::verify(&jumps)?;
            let used = record.used_slots();
            if used > cap {
                return Err(corrupt(format!("block {} idx_last beyond capacity", nr)));
            }
            let mut last_live = None;
            for slot in skipfield::live_slots(&jumps) {
                last_live = Some(slot?);
            }
            if matches!(last_live, Some(slot) if slot >= used) {
                return Err(corrupt(format!("block {} has a live slot past idx_last", nr)));
            }

            if free_set.contains(&nr) {
                if live != 0 || record.free_idx_count != 0 || used != cap {
                    return Err(corrupt(format!("free block {} is not empty", nr)));
                }
            } else {
                let listed = holes_per_block.get(&nr).copied().unwrap_or(0);
                if live == 0 {
                    return Err(corrupt(format!("block {} is empty but not free", nr)));
                }
                if record.free_idx_count != listed || listed != used - live {
                    return Err(corrupt(format!(
                        "block {} counts {} holes, lists {}, has {}",
                        nr,
                        record.free_idx_count,
                        listed,
                        used - live
                    )));
                }
                unused += cap - used;
            }
            live_total += live;
        }

        if live_total != rec.colony_size {
            return Err(corrupt(format!(
                "{} live slots but colony_size is {}",
                live_total, rec.colony_size
            )));
        }
        if rec.colony_size + rec.free_idx_count + rec.free_block_count * cap + unused
            != rec.colony_capacity
        {
            return Err(corrupt(format!(
                "size {} + holes {} + free blocks {} * {} + unused {} != capacity {}",
                rec.colony_size,
                rec.free_idx_count,
                rec.free_block_count,
                cap,
                unused,
                rec.colony_capacity
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Pool, PoolConfig};

    fn pool() -> Pool {
        Pool::create_in_memory(&PoolConfig {
            pool_size: 512 * 1024,
            undo_log_size: 64 * 1024,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    fn block_record(colony: &Colony, pool: &Pool, nr: u64) -> BlockRecord {
        BlockRecord::load(pool, colony.block(pool, nr).unwrap()).unwrap()
    }

    #[test]
    fn test_emptied_partial_tail_is_promoted() {
        let mut pool = pool();
        let colony = Colony::create(&mut pool, "tail", ElementKind::Int, 4).unwrap();
        for v in 0..6 {
            colony.insert(&mut pool, v).unwrap();
        }
        assert_eq!(block_record(&colony, &pool, 1).idx_last, 1);
        assert_eq!(colony.skipfield(&pool, 1).unwrap(), vec![0, 0, 2, 2]);

        colony.remove(&mut pool, 4).unwrap();
        assert_eq!(colony.hole_list(&pool).unwrap(), vec![4]);
        colony.remove(&mut pool, 5).unwrap();

        let tail = block_record(&colony, &pool, 1);
        assert_eq!(tail.idx_last, 3);
        assert_eq!(tail.free_idx_count, 0);
        assert_eq!(colony.skipfield(&pool, 1).unwrap(), vec![4, 2, 3, 4]);
        assert!(colony.hole_list(&pool).unwrap().is_empty());
        assert_eq!(colony.free_block_list(&pool).unwrap(), vec![1]);

        let stats = colony.stats(&pool).unwrap();
        assert_eq!(stats.colony_size, 4);
        assert_eq!(stats.free_idx_count, 0);
        assert_eq!(stats.free_block_count, 1);
        assert_eq!(stats.colony_capacity, 8);
        colony.check_integrity(&pool).unwrap();

        // Demotion hands out slot 0, then every other slot newest-first
        assert_eq!(colony.insert(&mut pool, 40).unwrap(), 4);
        assert_eq!(colony.hole_list(&pool).unwrap(), vec![7, 6, 5]);
        assert_eq!(colony.skipfield(&pool, 1).unwrap(), vec![0, 3, 2, 3]);
        assert_eq!(block_record(&colony, &pool, 1).free_idx_count, 3);
        assert_eq!(colony.insert(&mut pool, 70).unwrap(), 7);
        assert_eq!(colony.insert(&mut pool, 60).unwrap(), 6);
        assert_eq!(colony.stats(&pool).unwrap().block_count, 2);
        colony.check_integrity(&pool).unwrap();
    }

    #[test]
    fn test_partial_tail_with_live_slots_stays() {
        let mut pool = pool();
        let colony = Colony::create(&mut pool, "tail", ElementKind::Int, 4).unwrap();
        for v in 0..7 {
            colony.insert(&mut pool, v).unwrap();
        }
        colony.remove(&mut pool, 4).unwrap();
        colony.remove(&mut pool, 6).unwrap();

        assert!(colony.free_block_list(&pool).unwrap().is_empty());
        assert_eq!(block_record(&colony, &pool, 1).idx_last, 2);
        assert_eq!(colony.hole_list(&pool).unwrap(), vec![6, 4]);
        // The never-used slot comes after both holes
        assert_eq!(colony.insert(&mut pool, 1).unwrap(), 6);
        assert_eq!(colony.insert(&mut pool, 1).unwrap(), 4);
        assert_eq!(colony.insert(&mut pool, 1).unwrap(), 7);
        colony.check_integrity(&pool).unwrap();
    }

    #[test]
    fn test_stale_clone_after_delete() {
        let mut pool = pool();
        let colony = Colony::create(&mut pool, "gone", ElementKind::Int, 4).unwrap();
        let stale = colony.clone();
        assert!(stale.is_linked(&pool).unwrap());

        colony.delete(&mut pool).unwrap();
        assert!(!stale.is_linked(&pool).unwrap());

        // A new colony under the same name is a different record
        let fresh = Colony::create(&mut pool, "gone", ElementKind::Int, 4).unwrap();
        assert!(fresh.is_linked(&pool).unwrap());
        assert_eq!(stale.is_linked(&pool).unwrap(), stale.record() == fresh.record());
    }
}
