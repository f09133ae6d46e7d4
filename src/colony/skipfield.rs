//! Skipfield codec
//!
//! One cell per slot. `0` marks a live slot. A maximal run of holes
//! `[s, e]` of length `L` stores `L` in its first cell and `k - s + 1` in
//! every later cell `k`, so the last cell also holds `L`:
//!
//! ```text
//! slot   0  1  2  3  4  5  6  7
//! jump   0  3  2  3  0  0  2  2
//!           └──run──┘       └run┘
//! ```
//!
//! A forward scan reads a cell: on `0` it visits the slot, otherwise it
//! jumps the whole run in one hop. A neighbour lookup from either side of a
//! run finds the run length in one read, which keeps [`mark_hole`] and
//! [`mark_live`] proportional to the cells they rewrite.

use crate::colony::layout::JUMP_SIZE;
use crate::core::store::{Handle, TxStore};
use crate::error::{ColonyError, Result};
use std::ops::Range;

/// Read access to one block's skipfield
pub trait JumpRead {
    fn len(&self) -> u64;

    fn jump(&self, slot: u64) -> Result<u64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access to one block's skipfield
pub trait JumpTable: JumpRead {
    /// Announce that the cells in `slots` are about to change
    fn prepare(&mut self, _slots: Range<u64>) -> Result<()> {
        Ok(())
    }

    fn set_jump(&mut self, slot: u64, value: u64) -> Result<()>;
}

impl JumpRead for Vec<u64> {
    fn len(&self) -> u64 {
        <[u64]>::len(self) as u64
    }

    fn jump(&self, slot: u64) -> Result<u64> {
        self.get(slot as usize)
            .copied()
            .ok_or_else(|| ColonyError::Corrupted(format!("skipfield slot {} out of range", slot)))
    }
}

impl JumpTable for Vec<u64> {
    fn set_jump(&mut self, slot: u64, value: u64) -> Result<()> {
        let cell = self
            .get_mut(slot as usize)
            .ok_or_else(|| ColonyError::Corrupted(format!("skipfield slot {} out of range", slot)))?;
        *cell = value;
        Ok(())
    }
}

/// A skipfield stored in a pool allocation, read-only
pub struct StoredJumps<'a, S> {
    store: &'a S,
    base: Handle,
    len: u64,
}

impl<'a, S: TxStore> StoredJumps<'a, S> {
    pub fn new(store: &'a S, base: Handle, len: u64) -> Self {
        StoredJumps { store, base, len }
    }
}

impl<S: TxStore> JumpRead for StoredJumps<'_, S> {
    fn len(&self) -> u64 {
        self.len
    }

    fn jump(&self, slot: u64) -> Result<u64> {
        self.store.read_u64(self.base.offset(slot * JUMP_SIZE))
    }
}

/// A skipfield stored in a pool allocation, updated transactionally
///
/// [`JumpTable::prepare`] protects the cells; writes then go straight to the
/// mapping.
pub struct StoredJumpsMut<'a, S> {
    store: &'a mut S,
    base: Handle,
    len: u64,
}

impl<'a, S: TxStore> StoredJumpsMut<'a, S> {
    pub fn new(store: &'a mut S, base: Handle, len: u64) -> Self {
        StoredJumpsMut { store, base, len }
    }
}

impl<S: TxStore> JumpRead for StoredJumpsMut<'_, S> {
    fn len(&self) -> u64 {
        self.len
    }

    fn jump(&self, slot: u64) -> Result<u64> {
        self.store.read_u64(self.base.offset(slot * JUMP_SIZE))
    }
}

impl<S: TxStore> JumpTable for StoredJumpsMut<'_, S> {
    fn prepare(&mut self, slots: Range<u64>) -> Result<()> {
        self.store.protect(
            self.base.offset(slots.start * JUMP_SIZE),
            (slots.end - slots.start) * JUMP_SIZE,
        )
    }

    fn set_jump(&mut self, slot: u64, value: u64) -> Result<()> {
        self.store
            .write_u64(self.base.offset(slot * JUMP_SIZE), value)
    }
}

/// Encode a skipfield whose every slot is a hole (one run)
///
/// Only used on freshly allocated memory, so nothing is protected.
pub fn fill_holes<T: JumpTable>(table: &mut T) -> Result<()> {
    let len = table.len();
    if len == 0 {
        return Ok(());
    }

    table.set_jump(0, len)?;
    for slot in 1..len {
        table.set_jump(slot, slot + 1)?;
    }
    Ok(())
}

/// Turn a live slot into a hole, merging with the runs on either side
///
/// Rewrites the first cell of the left run (if any) plus `slot` and every
/// cell of the right run, so the cost follows the right neighbour's length.
pub fn mark_hole<T: JumpTable>(table: &mut T, slot: u64) -> Result<()> {
    let len = table.len();
    if slot >= len {
        return Err(ColonyError::Corrupted(format!(
            "skipfield slot {} beyond block of {}",
            slot, len
        )));
    }
    if table.jump(slot)? != 0 {
        return Err(ColonyError::Corrupted(format!(
            "skipfield slot {} is already a hole",
            slot
        )));
    }

    let left = if slot > 0 { table.jump(slot - 1)? } else { 0 };
    let right = if slot + 1 < len {
        table.jump(slot + 1)?
    } else {
        0
    };

    let start = slot - left;
    let end = slot + right;
    let run = left + 1 + right;

    if start < slot {
        table.prepare(start..start + 1)?;
    }
    table.prepare(slot..end + 1)?;

    table.set_jump(start, run)?;
    for cell in slot.max(start + 1)..=end {
        table.set_jump(cell, cell - start + 1)?;
    }
    Ok(())
}

/// Turn a hole back into a live slot, splitting its run
pub fn mark_live<T: JumpTable>(table: &mut T, slot: u64) -> Result<()> {
    let len = table.len();
    if slot >= len {
        return Err(ColonyError::Corrupted(format!(
            "skipfield slot {} beyond block of {}",
            slot, len
        )));
    }
    let own = table.jump(slot)?;
    if own == 0 {
        return Err(ColonyError::Corrupted(format!(
            "skipfield slot {} is already live",
            slot
        )));
    }

    let is_run_start = slot == 0 || table.jump(slot - 1)? == 0;
    let start = if is_run_start { slot } else { slot + 1 - own };
    let run = table.jump(start)?;
    let end = start + run - 1;
    if end >= len || end < slot {
        return Err(ColonyError::Corrupted(format!(
            "skipfield run at {} has bad length {}",
            start, run
        )));
    }

    if start < slot {
        table.prepare(start..start + 1)?;
    }
    table.prepare(slot..end + 1)?;

    if start < slot {
        table.set_jump(start, slot - start)?;
    }
    table.set_jump(slot, 0)?;
    if end > slot {
        table.set_jump(slot + 1, end - slot)?;
        for cell in slot + 2..=end {
            table.set_jump(cell, cell - slot)?;
        }
    }
    Ok(())
}

/// Iterator over the live slots of one skipfield, one hop per hole run
pub struct LiveSlots<'t, T> {
    table: &'t T,
    next: u64,
    failed: bool,
}

impl<'t, T: JumpRead> Iterator for LiveSlots<'t, T> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.next < self.table.len() {
            match self.table.jump(self.next) {
                Ok(0) => {
                    let slot = self.next;
                    self.next += 1;
                    return Some(Ok(slot));
                }
                Ok(run) => self.next += run,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

pub fn live_slots<T: JumpRead>(table: &T) -> LiveSlots<'_, T> {
    LiveSlots {
        table,
        next: 0,
        failed: false,
    }
}

/// Check the encoding: every run is maximal and its cells count up from its
/// first cell, with the length in the first and last cell
///
/// Returns the number of live slots.
pub fn verify<T: JumpRead>(table: &T) -> Result<u64> {
    let len = table.len();
    let mut live = 0;
    let mut slot = 0;
    let mut prev_hole = false;

    while slot < len {
        let run = table.jump(slot)?;
        if run == 0 {
            live += 1;
            slot += 1;
            prev_hole = false;
            continue;
        }

        if prev_hole {
            return Err(ColonyError::Corrupted(format!(
                "skipfield runs touch at slot {}",
                slot
            )));
        }
        if slot + run > len {
            return Err(ColonyError::Corrupted(format!(
                "skipfield run at {} overruns the block ({} cells)",
                slot, run
            )));
        }
        for cell in slot + 1..slot + run {
            let expected = cell - slot + 1;
            if table.jump(cell)? != expected {
                return Err(ColonyError::Corrupted(format!(
                    "skipfield cell {} holds {}, expected {}",
                    cell,
                    table.jump(cell)?,
                    expected
                )));
            }
        }

        slot += run;
        prev_hole = true;
    }

    Ok(live)
}
