// Path: crates/types/tests/hashing_properties.rs
//! Property tests for the hashing rules of values and states.

use isaac_types::app::{Hash, Height, State, Value};
use isaac_types::codec::{decode_hinted, encode_hinted};
use isaac_types::hint::Hintset;
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9_.-]{1,16}"
}

proptest! {
    #[test]
    fn state_hash_is_deterministic(
        key in key_strategy(),
        value in proptest::collection::vec(any::<u8>(), 0..64),
        height in 0i64..1_000_000,
        ops in proptest::collection::vec(any::<[u8; 32]>(), 0..8),
    ) {
        let build = || {
            let mut s = State::new(key.clone(), Some(Value::bytes(value.clone())), Height(height)).unwrap();
            for op in &ops {
                s = s.add_operation(Hash::sha256(op));
            }
            s.set_hash().unwrap()
        };
        let a = build();
        let b = build();
        prop_assert_eq!(a.hash(), b.hash());
        prop_assert!(a.is_valid().is_ok());
    }

    #[test]
    fn merge_is_deterministic(
        key in key_strategy(),
        left in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
        right in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..16)),
    ) {
        let a = State::new(key.clone(), left.map(Value::bytes), Height(1)).unwrap();
        let b = State::new(key, right.map(Value::bytes), Height(2)).unwrap();
        let m1 = a.merge(&b).unwrap().set_hash().unwrap();
        let m2 = a.merge(&b).unwrap().set_hash().unwrap();
        prop_assert_eq!(m1.hash(), m2.hash());
    }

    #[test]
    fn hinted_state_roundtrip(
        key in key_strategy(),
        n in any::<i64>(),
    ) {
        let state = State::new(key, Some(Value::int(n)), Height(0)).unwrap().set_hash().unwrap();
        let blob = encode_hinted(&state).unwrap();
        let back: State = decode_hinted(&blob, &Hintset::isaac()).unwrap();
        prop_assert_eq!(back, state);
    }
}
