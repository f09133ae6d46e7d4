//! Directory of named colonies
//!
//! Colony records form a singly linked list whose head is the pool root.
//! New colonies are linked at the head.

use crate::colony::layout::{read_colony, write_colony, ColonyField};
use crate::core::store::{Handle, TxStore};
use crate::core::validation::{ColonyName, NAME_FIELD_LEN};
use crate::error::{ColonyError, Result};

/// Every colony record, most recently created first
pub fn records<S: TxStore>(store: &S) -> Result<Vec<Handle>> {
    let mut records = Vec::new();
    let mut record = store.root();

    while !record.is_null() {
        if records.contains(&record) {
            return Err(ColonyError::Corrupted("colony directory has a cycle".into()));
        }
        records.push(record);
        record = Handle::from_raw(read_colony(store, record, ColonyField::Next)?);
    }
    Ok(records)
}

/// Record of the colony called `name`, if any
pub fn find<S: TxStore>(store: &S, name: &ColonyName) -> Result<Option<Handle>> {
    let wanted = name.to_field();
    for record in records(store)? {
        if store.dereference(record, NAME_FIELD_LEN as u64)? == &wanted[..] {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Link a record at the head of the directory
pub fn link<S: TxStore>(store: &mut S, record: Handle) -> Result<()> {
    let head = store.root();
    write_colony(store, record, ColonyField::Next, head.raw())?;
    store.set_root(record)
}

/// Unlink a record from the directory
pub fn unlink<S: TxStore>(store: &mut S, record: Handle) -> Result<()> {
    let next = read_colony(store, record, ColonyField::Next)?;
    if store.root() == record {
        return store.set_root(Handle::from_raw(next));
    }

    let mut current = store.root();
    while !current.is_null() {
        let after = Handle::from_raw(read_colony(store, current, ColonyField::Next)?);
        if after == record {
            return write_colony(store, current, ColonyField::Next, next);
        }
        current = after;
    }

    Err(ColonyError::Corrupted(format!(
        "colony record {} is not in the directory",
        record
    )))
}

