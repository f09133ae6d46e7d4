//! Reopen and crash-recovery behaviour on file-backed pools
//!
//! A crash is simulated by opening a transaction, running colony operations
//! inside it and dropping the pool without committing. The undo log left in
//! the file must bring the pool back to its last committed state on open.

use colony_rs::{Colony, ColonyError, Durability, ElementKind, Item, Pool, PoolBuilder, TxStore};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_pool(dir: &TempDir) -> (PathBuf, Pool) {
    let path = dir.path().join("crash.colony");
    let pool = PoolBuilder::new()
        .pool_size(1024 * 1024)
        .undo_log_size(128 * 1024)
        .create(&path)
        .unwrap();
    (path, pool)
}

fn reopen(path: &Path) -> Pool {
    Pool::open(path, Durability::Strict).unwrap()
}

fn populated(pool: &mut Pool) -> Colony {
    let colony = Colony::create(pool, "survivor", ElementKind::Int, 4).unwrap();
    for v in 0..14 {
        colony.insert(pool, v * 100).unwrap();
    }
    colony.remove_range(pool, 4, 7).unwrap();
    colony.remove(pool, 9).unwrap();
    colony
}

#[test]
fn test_committed_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let (path, mut pool) = create_pool(&dir);
    let colony = populated(&mut pool);
    let entries = colony.entries(&pool).unwrap();
    let stats = colony.stats(&pool).unwrap();
    pool.close().unwrap();

    let pool = reopen(&path);
    let colony = Colony::open(&pool, "survivor").unwrap();
    assert_eq!(colony.entries(&pool).unwrap(), entries);
    assert_eq!(colony.stats(&pool).unwrap(), stats);
    assert_eq!(colony.hole_list(&pool).unwrap(), vec![9]);
    assert_eq!(colony.free_block_list(&pool).unwrap(), vec![1]);
    colony.check_integrity(&pool).unwrap();
}

#[test]
fn test_crash_during_inserts_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (path, mut pool) = create_pool(&dir);
    let colony = populated(&mut pool);
    let entries = colony.entries(&pool).unwrap();
    let free_bytes = pool.stats().free_bytes;

    pool.begin_transaction().unwrap();
    // Hole reuse, demotion, then a fresh block
    for v in 0..10 {
        colony.insert(&mut pool, -v).unwrap();
    }
    assert!(pool.pending_undo_entries() > 0);
    drop(pool);

    let pool = reopen(&path);
    let colony = Colony::open(&pool, "survivor").unwrap();
    assert_eq!(colony.entries(&pool).unwrap(), entries);
    assert_eq!(pool.stats().free_bytes, free_bytes);
    colony.check_integrity(&pool).unwrap();
}

#[test]
fn test_crash_during_removals_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (path, mut pool) = create_pool(&dir);
    let colony = populated(&mut pool);
    let stats = colony.stats(&pool).unwrap();

    pool.begin_transaction().unwrap();
    colony.remove_range(&mut pool, 0, 13).unwrap();
    colony.delete_free_blocks(&mut pool).unwrap();
    drop(pool);

    let pool = reopen(&path);
    let colony = Colony::open(&pool, "survivor").unwrap();
    assert_eq!(colony.stats(&pool).unwrap(), stats);
    assert_eq!(colony.get(&pool, 13).unwrap(), Item::Int(1300));
    colony.check_integrity(&pool).unwrap();
}

#[test]
fn test_crash_during_create_and_delete_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (path, mut pool) = create_pool(&dir);
    let colony = populated(&mut pool);
    let free_bytes = pool.stats().free_bytes;

    pool.begin_transaction().unwrap();
    let other = Colony::create(&mut pool, "phantom", ElementKind::ObjectRef, 16).unwrap();
    let oid = pool.object_ref(colony.record());
    other.insert(&mut pool, oid).unwrap();
    colony.delete(&mut pool).unwrap();
    drop(pool);

    let pool = reopen(&path);
    let names: Vec<String> = Colony::list(&pool)
        .unwrap()
        .into_iter()
        .map(|stats| stats.name)
        .collect();
    assert_eq!(names, vec!["survivor".to_string()]);
    assert!(matches!(
        Colony::open(&pool, "phantom"),
        Err(ColonyError::ColonyNotFound(_))
    ));
    assert_eq!(pool.stats().free_bytes, free_bytes);
    Colony::open(&pool, "survivor")
        .unwrap()
        .check_integrity(&pool)
        .unwrap();
}

#[test]
fn test_recovered_pool_accepts_new_transactions() {
    let dir = TempDir::new().unwrap();
    let (path, mut pool) = create_pool(&dir);
    let colony = populated(&mut pool);

    pool.begin_transaction().unwrap();
    colony.insert(&mut pool, 7).unwrap();
    drop(pool);

    let mut pool = reopen(&path);
    let colony = Colony::open(&pool, "survivor").unwrap();
    assert_eq!(colony.insert(&mut pool, 7).unwrap(), 9);
    pool.close().unwrap();

    let pool = reopen(&path);
    let colony = Colony::open(&pool, "survivor").unwrap();
    assert_eq!(colony.get(&pool, 9).unwrap(), Item::Int(7));
}

#[test]
fn test_corrupted_undo_entry_refuses_open() {
    let dir = TempDir::new().unwrap();
    let (path, mut pool) = create_pool(&dir);
    let colony = populated(&mut pool);

    pool.begin_transaction().unwrap();
    colony.remove(&mut pool, 0).unwrap();
    drop(pool);

    // First byte of the first entry's pre-image: header page, log header,
    // entry header
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(4096 + 32 + 16)).unwrap();
    file.write_all(&[0x5A]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let result = Pool::open(&path, Durability::Strict);
    assert!(matches!(result, Err(ColonyError::UndoLogCorrupted(_))));
}

#[test]
fn test_open_rejects_foreign_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not-a-pool");
    std::fs::write(&path, vec![0u8; 128 * 1024]).unwrap();

    assert!(matches!(
        Pool::open(&path, Durability::Strict),
        Err(ColonyError::InvalidMagic)
    ));
}
