// Path: crates/state/src/pool/tests/mod.rs
use super::*;
use async_trait::async_trait;
use isaac_types::app::Value;
use std::collections::HashMap;

#[derive(Default)]
struct MemReader {
    states: HashMap<String, State>,
}

#[async_trait]
impl StateReader for MemReader {
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError> {
        Ok(self.states.get(key).cloned())
    }
}

fn committed(key: &str, v: &[u8]) -> State {
    State::new(key, Some(Value::bytes(v.to_vec())), Height(1))
        .unwrap()
        .set_previous_block(Hash::sha256(b"h0"))
        .add_operation(Hash::sha256(b"old-op"))
        .set_hash()
        .unwrap()
}

fn reader() -> MemReader {
    MemReader {
        states: HashMap::from([("a".to_string(), committed("a", b"1"))]),
    }
}

#[tokio::test]
async fn test_get_falls_back_to_store_then_empty() {
    let pool = StatePool::new(reader(), Height(2));
    let a = pool.get("a").await.unwrap();
    assert_eq!(a.value(), Some(&Value::bytes(b"1".to_vec())));
    assert_eq!(a.height(), Height(2));
    assert!(a.operations().is_empty());

    let fresh = pool.get("b").await.unwrap();
    assert!(fresh.value().is_none());
    assert!(matches!(pool.get("bad key").await, Err(PoolError::State(_))));
}

#[tokio::test]
async fn test_set_tracks_facts_and_updates() {
    let pool = StatePool::new(reader(), Height(2));
    let fact = Hash::sha256(b"fact-1");
    let a = pool.get("a").await.unwrap().set_value(Some(Value::bytes(b"2".to_vec())));
    let b = pool.get("b").await.unwrap().set_value(Some(Value::string("x")));
    pool.set(&fact, vec![b, a]).await.unwrap();

    let updates = pool.updates();
    let keys: Vec<&str> = updates.iter().map(|u| u.key()).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(pool.inserted_operations(), vec![fact.clone()]);

    let a = pool.get("a").await.unwrap();
    assert_eq!(a.value(), Some(&Value::bytes(b"2".to_vec())));
    assert_eq!(a.operations(), &[fact]);
}

#[tokio::test]
async fn test_repeated_fact_is_recorded_once() {
    let pool = StatePool::new(reader(), Height(2));
    let fact = Hash::sha256(b"fact");
    for v in [b"x", b"y"] {
        let st = pool.get("a").await.unwrap().set_value(Some(Value::bytes(v.to_vec())));
        pool.set(&fact, vec![st]).await.unwrap();
    }
    let a = pool.get("a").await.unwrap();
    assert_eq!(a.operations().len(), 1);
    assert_eq!(pool.inserted_operations().len(), 1);
}

#[tokio::test]
async fn test_failed_set_restores_every_touched_updater() {
    let pool = StatePool::new(reader(), Height(2));
    let first = Hash::sha256(b"first");
    let st = pool.get("a").await.unwrap().set_value(Some(Value::bytes(b"2".to_vec())));
    pool.set(&first, vec![st]).await.unwrap();

    let second = Hash::sha256(b"second");
    let a = pool.get("a").await.unwrap().set_value(Some(Value::bytes(b"3".to_vec())));
    let c = pool.get("c").await.unwrap().set_value(Some(Value::int(1)));
    // lower height is rejected by merge
    let stale = State::new("d", Some(Value::int(9)), Height(1)).unwrap();
    let err = pool.set(&second, vec![a, c, stale]).await;
    assert!(matches!(err, Err(PoolError::State(StateError::HeightRegression { .. }))));

    let a = pool.get("a").await.unwrap();
    assert_eq!(a.value(), Some(&Value::bytes(b"2".to_vec())));
    assert_eq!(a.operations(), &[first.clone()]);
    assert!(pool.get("c").await.unwrap().value().is_none());
    assert_eq!(pool.inserted_operations(), vec![first]);
    let keys: Vec<String> = pool.updates().iter().map(|u| u.key().to_string()).collect();
    assert_eq!(keys, vec!["a".to_string()]);
}

#[tokio::test]
async fn test_finish_links_previous_block_and_hashes() {
    let pool = StatePool::new(reader(), Height(2));
    let fact = Hash::sha256(b"f");
    let st = pool.get("a").await.unwrap().set_value(Some(Value::bytes(b"2".to_vec())));
    pool.set(&fact, vec![st]).await.unwrap();

    let head = Hash::sha256(b"h1");
    let updates = pool.updates();
    let finished = updates.first().unwrap().finish(&head).unwrap();
    assert_eq!(finished.previous_block(), Some(&head));
    assert_eq!(finished.height(), Height(2));
    assert!(finished.is_valid().is_ok());
    assert_eq!(finished.hash(), Some(&finished.generate_hash()));

    pool.done();
    assert!(pool.updates().is_empty());
}

#[test]
fn test_updater_reset_and_set_height() {
    let base = committed("a", b"1");
    let u = StateUpdater::new("a", Some(base.clone()), Height(2)).unwrap();
    u.set_value(Some(Value::bytes(b"9".to_vec())));
    u.add_operation(&Hash::sha256(b"op"));
    u.add_operation(&Hash::sha256(b"op"));
    assert_eq!(u.state().operations().len(), 1);
    assert!(u.is_updated());

    u.set_height(Height(3));
    assert!(u.state().operations().is_empty());
    u.add_operation(&Hash::sha256(b"op"));
    assert_eq!(u.state().operations().len(), 1);

    u.reset();
    assert!(!u.is_updated());
    assert_eq!(u.state().value(), base.value());
    assert_eq!(u.base(), Some(base));

    assert!(StateUpdater::new("b", Some(committed("a", b"1")), Height(2)).is_err());
}
