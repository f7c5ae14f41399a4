// Path: crates/state/src/tree/avl/tests.rs
use super::*;
use proptest::prelude::*;

fn value(key: &[u8]) -> Hash {
    Hash::sha256([b"v:".as_slice(), key].concat())
}

fn build_from(keys: &[Vec<u8>]) -> FixedTree {
    let mut builder = AvlTreeBuilder::new();
    for k in keys {
        builder.insert(k.clone(), value(k)).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn test_every_rotation_case_balances() {
    // left-left, right-right, left-right and right-left insertions of three keys
    for order in [
        [b"c", b"b", b"a"],
        [b"a", b"b", b"c"],
        [b"c", b"a", b"b"],
        [b"a", b"c", b"b"],
    ] {
        let mut builder = AvlTreeBuilder::new();
        for k in order {
            builder.insert(k.to_vec(), value(k)).unwrap();
        }
        assert_eq!(builder.height(), 1);
        let tree = builder.build().unwrap();
        tree.verify().unwrap();
        assert_eq!(tree.keys(), vec![b"a".as_slice(), b"b", b"c"]);
        let root = tree.nodes().iter().find(|n| Some(&n.hash) == tree.root_hash()).unwrap();
        assert_eq!(root.key, b"b".to_vec());
    }
}

#[test]
fn test_height_stays_logarithmic() {
    let mut builder = AvlTreeBuilder::new();
    for i in 0u32..1024 {
        let k = i.to_be_bytes();
        builder.insert(k.to_vec(), value(&k)).unwrap();
    }
    assert_eq!(builder.len(), 1024);
    // 1.44 * log2(1024)
    assert!(builder.height() <= 14);
    builder.build().unwrap().verify().unwrap();
}

#[test]
fn test_insert_replaces_value() {
    let mut builder = AvlTreeBuilder::new();
    builder.insert(b"k".to_vec(), value(b"old")).unwrap();
    builder.insert(b"k".to_vec(), value(b"new")).unwrap();
    assert_eq!(builder.len(), 1);
    assert_eq!(builder.get(b"k"), Some(&value(b"new")));
    let tree = builder.build().unwrap();
    assert_eq!(tree.get(b"k").map(|n| &n.value_hash), Some(&value(b"new")));
}

#[test]
fn test_root_hash_rule() {
    let tree = build_from(&[b"only".to_vec()]);
    assert_eq!(
        tree.root_hash(),
        Some(&Hash::sha256(value(b"only").as_bytes()))
    );
    assert!(AvlTreeBuilder::new().build().unwrap().root_hash().is_none());
}

#[test]
fn test_root_hash_before_and_after_build_agree() {
    let mut builder = AvlTreeBuilder::new();
    for k in [b"m".to_vec(), b"a".to_vec(), b"z".to_vec(), b"q".to_vec()] {
        builder.insert(k.clone(), value(&k)).unwrap();
    }
    let root = builder.root_hash().unwrap();
    let tree = builder.build().unwrap();
    assert_eq!(tree.root_hash(), root.as_ref());
}

proptest! {
    #[test]
    fn root_is_invariant_under_insertion_order(
        keys in proptest::collection::btree_set(proptest::collection::vec(any::<u8>(), 1..12), 1..64),
        seed in any::<u64>(),
    ) {
        let sorted: Vec<Vec<u8>> = keys.into_iter().collect();
        let mut shuffled = sorted.clone();
        // deterministic Fisher-Yates driven by the seed
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }
        let a = build_from(&sorted);
        let b = build_from(&shuffled);
        prop_assert!(a.verify().is_ok());
        prop_assert!(b.verify().is_ok());
        prop_assert_eq!(a.root_hash(), b.root_hash());
    }
}
