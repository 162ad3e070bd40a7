//! B+tree Index Tests
//!
//! Scenario tests across both node encodings, file-backed reloads and
//! page accounting.

use pagetree::index::predicate::{gte, limit, lt, range};
use pagetree::index::{
    BTreeIndexFactory, BytesCodec, Encoding, PredicateVisitor, StringCodec, StringPrefixer,
    U32Codec, U64Codec,
};
use pagetree::storage::{FilePaged, MemoryPaged, Paged};
use pagetree::{Error, PageId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn factories() -> Vec<BTreeIndexFactory<u32, u64>> {
    let deferred = BTreeIndexFactory::new(U32Codec, U64Codec);
    let immediate = deferred.clone().deferred_encoding(false);
    assert_eq!(deferred.encoding(), Encoding::Deferred);
    assert_eq!(immediate.encoding(), Encoding::Immediate);
    vec![deferred, immediate]
}

fn shuffled(count: u32) -> Vec<u32> {
    let mut keys: Vec<u32> = (0..count).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(0));
    keys
}

// ============================================================================
// Durability
// ============================================================================

/// Insert 0..9999 in order, reopen the file and read every key back.
#[test]
fn test_ordered_inserts_survive_reload() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");
    let factory = BTreeIndexFactory::new(U32Codec, StringCodec);

    let root;
    let free;
    {
        let paged = FilePaged::create(&path, 500, 8192).unwrap();
        let index = factory.create(&paged).unwrap();
        root = index.page();
        for key in 0..10_000u32 {
            assert_eq!(index.put(key, format!("value {key}")).unwrap(), None);
        }
        assert_eq!(index.page(), root);
        index.verify().unwrap();
        free = paged.allocator().free_ranges();
        paged.flush().unwrap();
    }

    let paged = FilePaged::open(&path, 500, 8192).unwrap();
    paged.allocator().set_free_ranges(free);
    let index = factory.open(&paged, root).unwrap();

    assert_eq!(index.size().unwrap(), 10_000);
    for key in 0..10_000u32 {
        assert_eq!(index.get(&key).unwrap(), Some(format!("value {key}")));
    }
    assert_eq!(index.first().unwrap(), Some((0, "value 0".to_string())));
    assert_eq!(index.last().unwrap(), Some((9_999, "value 9999".to_string())));
    assert_eq!(index.min_leaf_depth().unwrap(), index.max_leaf_depth().unwrap());

    // Still writable after the reload.
    index.put(10_000, "value 10000".into()).unwrap();
    assert_eq!(index.size().unwrap(), 10_001);
    index.verify().unwrap();
}

// ============================================================================
// Removal
// ============================================================================

/// Remove 40 keys in a seeded random order; the index ends up empty.
#[test]
fn test_shuffled_removal_empties_index() {
    init_tracing();
    for factory in factories() {
        let paged = MemoryPaged::new(64, 512).unwrap();
        let index = factory.create(&paged).unwrap();
        let root = index.page();
        let free = paged.allocator().free_page_count();

        for key in 0..40u32 {
            index.put(key, u64::from(key) * 10).unwrap();
        }
        assert!(index.max_leaf_depth().unwrap() > 1);

        for key in shuffled(40) {
            assert_eq!(index.remove(&key).unwrap(), Some(u64::from(key) * 10));
            assert_eq!(index.get(&key).unwrap(), None);
            index.verify().unwrap();
        }

        assert!(index.is_empty().unwrap());
        assert_eq!(index.size().unwrap(), 0);
        assert_eq!(index.page(), root);
        assert_eq!(index.max_leaf_depth().unwrap(), 1);
        assert_eq!(paged.allocator().free_page_count(), free);
    }
}

/// Thousands of random removals keep the tree consistent throughout.
#[test]
fn test_random_removals_keep_structure() {
    for factory in factories() {
        let paged = MemoryPaged::new(100, 4096).unwrap();
        let index = factory.create(&paged).unwrap();

        for key in 0..4_000u32 {
            index.put(key, u64::from(key)).unwrap();
        }
        let order = shuffled(4_000);
        for (n, key) in order.iter().enumerate() {
            assert_eq!(index.remove(key).unwrap(), Some(u64::from(*key)));
            if n % 500 == 0 {
                index.verify().unwrap();
                assert_eq!(index.size().unwrap(), 4_000 - n - 1);
            }
        }
        assert!(index.is_empty().unwrap());
        index.verify().unwrap();
    }
}

/// Removing an absent key changes nothing.
#[test]
fn test_remove_absent_key() {
    let paged = MemoryPaged::new(64, 128).unwrap();
    let index = BTreeIndexFactory::new(U32Codec, U64Codec).create(&paged).unwrap();
    for key in (0..30u32).map(|k| k * 2) {
        index.put(key, 1).unwrap();
    }
    let free = paged.allocator().free_page_count();

    assert_eq!(index.remove(&7).unwrap(), None);
    assert_eq!(index.size().unwrap(), 30);
    assert_eq!(paged.allocator().free_page_count(), free);
}

// ============================================================================
// Insertion
// ============================================================================

/// The root page id never changes while the tree grows and shrinks.
#[test]
fn test_root_page_is_stable() {
    for factory in factories() {
        let paged = MemoryPaged::new(64, 1024).unwrap();
        let index = factory.create(&paged).unwrap();
        let root = index.page();

        for key in shuffled(300) {
            index.put(key, 0).unwrap();
            assert_eq!(index.page(), root);
        }
        assert!(index.min_leaf_depth().unwrap() >= 3);

        let reopened = factory.open(&paged, root).unwrap();
        assert_eq!(reopened.size().unwrap(), 300);
    }
}

#[test]
fn test_put_if_absent() {
    for factory in factories() {
        let paged = MemoryPaged::new(64, 256).unwrap();
        let index = factory.create(&paged).unwrap();
        for key in 0..50u32 {
            assert_eq!(index.put_if_absent(key, 1).unwrap(), None);
        }
        for key in 0..50u32 {
            assert_eq!(index.put_if_absent(key, 2).unwrap(), Some(1));
            assert_eq!(index.get(&key).unwrap(), Some(1));
        }
        assert_eq!(index.put(3, 3).unwrap(), Some(1));
        assert_eq!(index.get(&3).unwrap(), Some(3));
        assert!(index.contains_key(&49).unwrap());
        assert!(!index.contains_key(&50).unwrap());
    }
}

/// String keys with separators shortened by a prefixer.
#[test]
fn test_prefixed_separators() {
    let paged = MemoryPaged::new(128, 1024).unwrap();
    let index = BTreeIndexFactory::new(StringCodec, U32Codec)
        .prefixer(StringPrefixer)
        .create(&paged)
        .unwrap();

    let keys: Vec<String> = (0..500u32)
        .map(|i| format!("customer/{:05}/{}", i * 7919 % 500, "x".repeat((i % 5) as usize)))
        .collect();
    for (i, key) in keys.iter().enumerate() {
        index.put(key.clone(), i as u32).unwrap();
    }
    index.verify().unwrap();
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(index.get(key).unwrap(), Some(i as u32));
    }

    let mut sorted = keys.clone();
    sorted.sort();
    let walked: Vec<String> = index.iter().unwrap().map(|e| e.unwrap().0).collect();
    assert_eq!(walked, sorted);
}

/// A key that could never share a branch page with two others is refused
/// before anything is written.
#[test]
fn test_oversized_key_rejected() {
    let paged = MemoryPaged::new(64, 64).unwrap();
    let index = BTreeIndexFactory::new(StringCodec, U32Codec)
        .deferred_encoding(false)
        .create(&paged)
        .unwrap();
    let free = paged.allocator().free_page_count();

    let err = index.put("k".repeat(40), 1).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(index.is_empty().unwrap());
    assert_eq!(paged.allocator().free_page_count(), free);
}

// ============================================================================
// Page accounting
// ============================================================================

/// Shrinking a value that spanned three pages gives exactly two back.
#[test]
fn test_overwrite_releases_linked_pages() {
    let factory = BTreeIndexFactory::new(U32Codec, BytesCodec);
    for factory in [factory.clone(), factory.deferred_encoding(false)] {
        let paged = MemoryPaged::new(64, 64).unwrap();
        let index = factory.create(&paged).unwrap();
        let empty = paged.allocator().free_page_count();

        // 4 + 4 + (4 + 150) + 4 = 166 bytes plus a 9 byte header: 3 pages.
        index.put(1, vec![0xAB; 150]).unwrap();
        let big = paged.allocator().free_page_count();
        assert_eq!(empty - big, 2);

        index.put(1, vec![0xCD; 10]).unwrap();
        assert_eq!(paged.allocator().free_page_count() - big, 2);
        assert_eq!(index.get(&1).unwrap(), Some(vec![0xCD; 10]));

        index.put(1, vec![0xEF; 150]).unwrap();
        assert_eq!(index.remove(&1).unwrap(), Some(vec![0xEF; 150]));
        assert_eq!(paged.allocator().free_page_count(), empty);
    }
}

/// A put the codec refuses leaves the stored value and its linked pages
/// alone, even after every free page is reused.
#[test]
fn test_rejected_put_keeps_linked_pages() {
    init_tracing();
    let factory = BTreeIndexFactory::new(U32Codec, StringCodec);
    for factory in [factory.clone(), factory.deferred_encoding(false)] {
        let paged = MemoryPaged::new(64, 256).unwrap();
        let index = factory.create(&paged).unwrap();
        let long = "a".repeat(150);
        index.put(1, long.clone()).unwrap();
        let free = paged.allocator().free_page_count();

        let err = index.put(1, "b".repeat(70_000)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
        assert_eq!(paged.allocator().free_page_count(), free);

        let rest = paged.allocator().alloc(free).unwrap();
        for i in 0..free {
            paged.write(rest.offset(i), &[0u8; 64]).unwrap();
        }
        assert_eq!(index.get(&1).unwrap(), Some(long));
        index.verify().unwrap();
    }
}

/// A rejected insert into a multi-level tree changes nothing.
#[test]
fn test_rejected_insert_leaves_tree_untouched() {
    let factory = BTreeIndexFactory::new(U32Codec, StringCodec);
    for factory in [factory.clone(), factory.deferred_encoding(false)] {
        let paged = MemoryPaged::new(64, 1024).unwrap();
        let index = factory.create(&paged).unwrap();
        for key in 0..200u32 {
            index.put(key, key.to_string()).unwrap();
        }
        let free = paged.allocator().free_page_count();

        assert!(index.put(100, "x".repeat(70_000)).is_err());
        assert!(index.put_if_absent(500, "x".repeat(70_000)).is_err());

        assert_eq!(paged.allocator().free_page_count(), free);
        assert_eq!(index.size().unwrap(), 200);
        assert_eq!(index.get(&100).unwrap(), Some("100".to_string()));
        index.verify().unwrap();
    }
}

#[test]
fn test_destroy_frees_everything() {
    for factory in factories() {
        let paged = MemoryPaged::new(64, 1024).unwrap();
        let free = paged.allocator().free_page_count();
        let index = factory.create(&paged).unwrap();
        for key in 0..200u32 {
            index.put(key, 0).unwrap();
        }
        index.destroy().unwrap();
        assert_eq!(paged.allocator().free_page_count(), free);
    }
}

// ============================================================================
// Iteration and queries
// ============================================================================

/// The leaf chain visits exactly the in-order sequence of keys.
#[test]
fn test_leaf_chain_matches_in_order() {
    for factory in factories() {
        let paged = MemoryPaged::new(64, 1024).unwrap();
        let index = factory.create(&paged).unwrap();
        let keys = shuffled(250);
        for &key in &keys {
            index.put(key, u64::from(key) + 1).unwrap();
        }
        for &key in keys.iter().filter(|k| *k % 3 == 0) {
            index.remove(&key).unwrap();
        }

        let expected: Vec<(u32, u64)> = (0..250u32)
            .filter(|k| k % 3 != 0)
            .map(|k| (k, u64::from(k) + 1))
            .collect();
        let walked: Vec<(u32, u64)> = index.iter().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(walked, expected);
        assert_eq!(index.size().unwrap(), expected.len());
        index.verify().unwrap();

        let tail: Vec<u32> = index.iter_from(&200).unwrap().map(|e| e.unwrap().0).collect();
        let expected_tail: Vec<u32> = (200..250u32).filter(|k| k % 3 != 0).collect();
        assert_eq!(tail, expected_tail);
    }
}

#[test]
fn test_predicates_and_visitors() {
    let paged = MemoryPaged::new(64, 1024).unwrap();
    let index = BTreeIndexFactory::new(U32Codec, U64Codec).create(&paged).unwrap();
    for key in 0..300u32 {
        index.put(key, u64::from(key)).unwrap();
    }

    let below: Vec<u32> = index.iter_predicate(lt(5)).map(|e| e.unwrap().0).collect();
    assert_eq!(below, vec![0, 1, 2, 3, 4]);

    let window: Vec<u32> = index
        .iter_predicate(range(120, 130))
        .map(|e| e.unwrap().0)
        .collect();
    assert_eq!(window, (120..130).collect::<Vec<_>>());

    let mut visitor = PredicateVisitor::new(limit(gte(290), 4));
    index.visit(&mut visitor).unwrap();
    let keys: Vec<u32> = visitor.entries().iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![290, 291, 292, 293]);

    let mut visitor = PredicateVisitor::new(range(1_000, 2_000));
    index.visit(&mut visitor).unwrap();
    assert!(visitor.into_entries().is_empty());
}

#[test]
fn test_print_structure() {
    let paged = MemoryPaged::new(128, 64).unwrap();
    let index = BTreeIndexFactory::new(U32Codec, U64Codec).create(&paged).unwrap();
    // Nine 12-byte entries fill a 128-byte leaf; the tenth splits it.
    for key in 0..10u32 {
        index.put(key, 0).unwrap();
    }

    let mut out = Vec::new();
    index.print_structure(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let expected = "\
branch @ 0 contains 1 keys
|-+ leaf @ 1 contains 5 keys
|   : 0
|   : 1
|   : 2
|   : 3
|   : 4
: 5
\\-+ leaf @ 2 contains 5 keys
    : 5
    : 6
    : 7
    : 8
    : 9
";
    assert_eq!(text, expected);
}

// ============================================================================
// Corruption
// ============================================================================

/// A branch that points back at itself is reported, not followed.
#[test]
fn test_cycle_detected() {
    let paged = MemoryPaged::new(128, 64).unwrap();
    let index = BTreeIndexFactory::new(U32Codec, U64Codec).create(&paged).unwrap();
    for key in 0..10u32 {
        index.put(key, 0).unwrap();
    }

    // Overwrite the right leaf with a copy of the root branch.
    let mut root = vec![0u8; 128];
    paged.read(PageId::new(0), &mut root).unwrap();
    paged.write(PageId::new(2), &root).unwrap();

    assert!(matches!(index.get(&9), Err(Error::CycleDetected(_))));
    assert!(matches!(index.put(9, 1), Err(Error::CycleDetected(_))));
    assert!(index.verify().unwrap_err().is_corruption());
    assert!(index.print_structure(&mut Vec::new()).is_err());
    assert_eq!(index.get(&0).unwrap(), Some(0));
}

/// A leaf chain that loops is caught by the walkers.
#[test]
fn test_leaf_chain_cycle_detected() {
    let paged = MemoryPaged::new(128, 64).unwrap();
    let index = BTreeIndexFactory::new(U32Codec, U64Codec).create(&paged).unwrap();
    for key in 0..10u32 {
        index.put(key, 0).unwrap();
    }

    // Make the right leaf a copy of the left one, whose next is the right leaf.
    let mut left = vec![0u8; 128];
    paged.read(PageId::new(1), &mut left).unwrap();
    paged.write(PageId::new(2), &left).unwrap();

    assert!(matches!(index.size(), Err(Error::CycleDetected(_))));
    let results: Vec<_> = index.iter().unwrap().collect();
    assert!(matches!(results.last(), Some(Err(Error::CycleDetected(_)))));
    assert!(index.verify().unwrap_err().is_corruption());
}
