//! Random put/remove sequences checked against `std::collections::BTreeMap`.

use std::collections::BTreeMap;

use pagetree::index::{BTreeIndexFactory, StringCodec, StringPrefixer, U32Codec};
use pagetree::storage::{MemoryPaged, Paged};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Put(u32, u32),
    PutIfAbsent(u32, u32),
    Remove(u32),
}

fn op(keys: u32) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => (0..keys, any::<u32>()).prop_map(|(k, v)| Op::PutIfAbsent(k, v)),
        2 => (0..keys).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_matches_btreemap(
        ops in prop::collection::vec(op(300), 1..400),
        deferred in any::<bool>(),
    ) {
        let paged = MemoryPaged::new(64, 2048).unwrap();
        let index = BTreeIndexFactory::new(U32Codec, U32Codec)
            .deferred_encoding(deferred)
            .create(&paged)
            .unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    prop_assert_eq!(index.put(k, v).unwrap(), model.insert(k, v));
                }
                Op::PutIfAbsent(k, v) => {
                    let existing = model.get(&k).copied();
                    model.entry(k).or_insert(v);
                    prop_assert_eq!(index.put_if_absent(k, v).unwrap(), existing);
                }
                Op::Remove(k) => {
                    prop_assert_eq!(index.remove(&k).unwrap(), model.remove(&k));
                }
            }
        }

        index.verify().unwrap();
        prop_assert_eq!(index.size().unwrap(), model.len());
        prop_assert_eq!(index.is_empty().unwrap(), model.is_empty());
        let walked: Vec<(u32, u32)> = index.iter().unwrap().map(|e| e.unwrap()).collect();
        let expected: Vec<(u32, u32)> = model.into_iter().collect();
        prop_assert_eq!(walked, expected);
    }

    #[test]
    fn prop_clear_returns_all_pages(
        keys in prop::collection::vec("[a-z]{1,12}", 1..200),
    ) {
        let paged = MemoryPaged::new(128, 2048).unwrap();
        let index = BTreeIndexFactory::new(StringCodec, U32Codec)
            .prefixer(StringPrefixer)
            .create(&paged)
            .unwrap();
        let free = paged.allocator().free_page_count();

        let mut model = BTreeMap::new();
        for (i, key) in keys.into_iter().enumerate() {
            index.put(key.clone(), i as u32).unwrap();
            model.insert(key, i as u32);
        }
        index.verify().unwrap();
        for (key, value) in &model {
            prop_assert_eq!(index.get(key).unwrap(), Some(*value));
        }

        index.clear().unwrap();
        prop_assert!(index.is_empty().unwrap());
        prop_assert_eq!(paged.allocator().free_page_count(), free);
    }
}
