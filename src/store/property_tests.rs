//! Property-Based Tests for Store Module
//!
//! Uses proptest to check value encoding and memory table behaviour over
//! generated inputs.

use proptest::prelude::*;
use std::collections::HashSet;

use super::memory::MemoryTable;
use super::{MemoryStore, Store};
use crate::value::{CacheValue, EncodedValue, ObjectRef};

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

fn scalar_strategy() -> impl Strategy<Value = CacheValue> {
    prop_oneof![
        Just(CacheValue::Null),
        any::<bool>().prop_map(CacheValue::Bool),
        any::<i64>().prop_map(CacheValue::Int),
        (-1_000_000i32..1_000_000).prop_map(|n| CacheValue::Float(f64::from(n) / 4.0)),
        "[a-zA-Z0-9 .]{0,32}".prop_map(CacheValue::Str),
    ]
}

/// Trees of lists and objects over scalar leaves.
fn value_strategy() -> impl Strategy<Value = CacheValue> {
    scalar_strategy().prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(CacheValue::List),
            prop::collection::vec(("[a-z]{1,8}", inner), 0..6)
                .prop_map(|fields| CacheValue::Object(ObjectRef::with_fields(fields))),
        ]
    })
}

#[derive(Debug, Clone)]
enum TableOp {
    Set { key: String, value: i64 },
    Get { key: String },
    Delete { key: String },
}

fn table_op_strategy() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        (valid_key_strategy(), any::<i64>()).prop_map(|(key, value)| TableOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| TableOp::Get { key }),
        valid_key_strategy().prop_map(|key| TableOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Decoding an encoded value yields a structurally equal value.
    #[test]
    fn prop_encoding_preserves_structure(value in value_strategy()) {
        let decoded = value.encode().decode().unwrap();
        prop_assert_eq!(&decoded, &value);

        let bytes = value.to_bytes().unwrap();
        prop_assert_eq!(CacheValue::from_bytes(&bytes).unwrap(), value);
    }

    // An object reachable through several paths is still one object after
    // a store round trip, and a self-reference still points at itself.
    #[test]
    fn prop_shared_objects_stay_shared(
        fields in prop::collection::vec(("[a-z]{1,8}", scalar_strategy()), 0..5)
    ) {
        let shared = ObjectRef::with_fields(fields);
        shared.set("self", shared.clone());
        let value = CacheValue::List(vec![
            CacheValue::Object(shared.clone()),
            CacheValue::Object(shared),
        ]);

        let store = MemoryStore::new("memory", 0, None);
        prop_assert!(store.set("graph", &value));
        let CacheValue::List(items) = store.get("graph").unwrap() else {
            return Err(TestCaseError::fail("expected a list"));
        };
        let first = items[0].as_object().unwrap();
        let second = items[1].as_object().unwrap();
        prop_assert!(first.ptr_eq(second));
        prop_assert!(first.get("self").unwrap().as_object().unwrap().ptr_eq(first));
    }

    // Hits and misses match what reads actually returned.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(table_op_strategy(), 1..50)) {
        let mut table = MemoryTable::new(100, None);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                TableOp::Set { key, value } => table.set(&key, EncodedValue::Int(value)),
                TableOp::Get { key } => match table.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                TableOp::Delete { key } => {
                    table.delete(&key);
                }
            }
        }

        let stats = table.stats();
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.total_entries, table.len());
    }

    // The table never holds more entries than its capacity.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((valid_key_strategy(), any::<i64>()), 1..200)
    ) {
        let max_entries = 50;
        let mut table = MemoryTable::new(max_entries, None);

        for (key, value) in entries {
            table.set(&key, EncodedValue::Int(value));
            prop_assert!(table.len() <= max_entries);
        }
    }

    // A read makes a key most recently used, so the next eviction skips it.
    #[test]
    fn prop_lru_access_tracking(
        keys in prop::collection::vec(valid_key_strategy(), 3..8),
        new_key in valid_key_strategy()
    ) {
        let unique: Vec<String> = keys
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        prop_assume!(unique.len() >= 3);
        prop_assume!(!unique.contains(&new_key));

        let mut table = MemoryTable::new(unique.len(), None);
        for key in &unique {
            table.set(key, EncodedValue::Null);
        }
        table.get(&unique[0]);
        table.set(&new_key, EncodedValue::Null);

        prop_assert!(table.contains(&unique[0]));
        prop_assert!(!table.contains(&unique[1]));
        prop_assert!(table.contains(&new_key));
    }

    // Deleting a stored key reports presence once, then absence.
    #[test]
    fn prop_delete_removes_entry(key in valid_key_strategy(), value in value_strategy()) {
        let store = MemoryStore::new("memory", 0, None);
        store.set(&key, &value);

        prop_assert!(store.delete(&key));
        prop_assert!(!store.delete(&key));
        prop_assert!(store.get(&key).is_none());
    }
}
