//! Property-based tests for colony behaviour
//!
//! Random operation sequences run against both a colony and a plain
//! `BTreeMap` model; after every step the two must agree and the colony's
//! structural cross-checks must pass.

use colony_rs::{Colony, ColonyError, ElementKind, Item, PoolBuilder};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Insert(i32),
    /// Remove the n-th live element (modulo the live count)
    Remove(usize),
    /// Remove an index that may or may not be live
    RemoveAny(u64),
    RemoveRange(u64, u64),
    DeleteFreeBlocks,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => any::<i32>().prop_map(Op::Insert),
        4 => any::<usize>().prop_map(Op::Remove),
        1 => (0u64..64).prop_map(Op::RemoveAny),
        1 => (0u64..64, 0u64..12).prop_map(|(from, span)| Op::RemoveRange(from, span)),
        1 => Just(Op::DeleteFreeBlocks),
    ]
}

fn model_entries(model: &BTreeMap<u64, i32>) -> Vec<(u64, Item)> {
    model.iter().map(|(&idx, &v)| (idx, Item::Int(v))).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_colony_matches_model(
        block_capacity in 1u64..7,
        ops in prop::collection::vec(op_strategy(), 1..120)
    ) {
        let mut pool = PoolBuilder::new()
            .pool_size(4 * 1024 * 1024)
            .undo_log_size(256 * 1024)
            .in_memory()
            .unwrap();
        let colony = Colony::create(&mut pool, "model", ElementKind::Int, block_capacity).unwrap();
        let mut model: BTreeMap<u64, i32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(v) => {
                    let holes = colony.hole_list(&pool).unwrap();
                    let idx = colony.insert(&mut pool, v).unwrap();
                    if let Some(&newest) = holes.first() {
                        prop_assert_eq!(idx, newest);
                    }
                    prop_assert!(model.insert(idx, v).is_none(), "index {} handed out twice", idx);
                }
                Op::Remove(n) => {
                    if model.is_empty() {
                        continue;
                    }
                    let idx = *model.keys().nth(n % model.len()).unwrap();
                    colony.remove(&mut pool, idx).unwrap();
                    model.remove(&idx);
                }
                Op::RemoveAny(idx) => {
                    let capacity = colony.stats(&pool).unwrap().colony_capacity;
                    match colony.remove(&mut pool, idx) {
                        Ok(()) => {
                            prop_assert!(model.remove(&idx).is_some());
                        }
                        Err(ColonyError::NotPresent(i)) => {
                            prop_assert_eq!(i, idx);
                            prop_assert!(idx < capacity && !model.contains_key(&idx));
                        }
                        Err(ColonyError::IndexOutOfRange { index, .. }) => {
                            prop_assert_eq!(index, idx);
                            prop_assert!(idx >= capacity);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {}", other),
                    }
                }
                Op::RemoveRange(from, span) => {
                    let capacity = colony.stats(&pool).unwrap().colony_capacity;
                    if capacity == 0 {
                        continue;
                    }
                    let from = from % capacity;
                    let to = (from + span).min(capacity - 1);
                    let expected: Vec<u64> = model.range(from..=to).map(|(&idx, _)| idx).collect();

                    let removed = colony.remove_range(&mut pool, from, to).unwrap();
                    prop_assert_eq!(removed, expected.len() as u64);
                    for idx in expected {
                        model.remove(&idx);
                    }
                }
                Op::DeleteFreeBlocks => {
                    let mut removed_blocks = colony.free_block_list(&pool).unwrap();
                    removed_blocks.sort_unstable();

                    let count = colony.delete_free_blocks(&mut pool).unwrap();
                    prop_assert_eq!(count, removed_blocks.len() as u64);

                    model = model
                        .into_iter()
                        .map(|(idx, v)| {
                            let nr = idx / block_capacity;
                            let before = removed_blocks.partition_point(|&r| r < nr) as u64;
                            (idx - before * block_capacity, v)
                        })
                        .collect();
                    prop_assert!(colony.free_block_list(&pool).unwrap().is_empty());
                }
            }

            prop_assert_eq!(colony.entries(&pool).unwrap(), model_entries(&model));
            prop_assert_eq!(colony.len(&pool).unwrap(), model.len() as u64);
            colony.check_integrity(&pool).unwrap();
        }
    }

    #[test]
    fn prop_reinsert_after_clear_needs_no_new_blocks(
        block_capacity in 1u64..9,
        count in 1u64..60
    ) {
        let mut pool = PoolBuilder::new()
            .pool_size(2 * 1024 * 1024)
            .undo_log_size(128 * 1024)
            .in_memory()
            .unwrap();
        let colony = Colony::create(&mut pool, "refill", ElementKind::Int, block_capacity).unwrap();

        for v in 0..count {
            colony.insert(&mut pool, v as i32).unwrap();
        }
        let blocks = colony.stats(&pool).unwrap().block_count;
        colony.remove_range(&mut pool, 0, count - 1).unwrap();

        let stats = colony.stats(&pool).unwrap();
        prop_assert_eq!(stats.colony_size, 0);
        prop_assert_eq!(stats.free_block_count, blocks);
        prop_assert_eq!(stats.free_idx_count, 0);

        for v in 0..count {
            let idx = colony.insert(&mut pool, v as i32).unwrap();
            prop_assert!(idx < stats.colony_capacity);
        }
        prop_assert_eq!(colony.stats(&pool).unwrap().block_count, blocks);
        colony.check_integrity(&pool).unwrap();
    }
}
