// Path: crates/api/src/state/tests/mod.rs
use super::StateReader;
use async_trait::async_trait;
use isaac_types::app::{Height, State, Value};
use isaac_types::error::StorageError;
use std::collections::HashMap;
use std::sync::Arc;

struct MapReader {
    data: HashMap<String, State>,
}

#[async_trait]
impl StateReader for MapReader {
    async fn state(&self, key: &str) -> Result<Option<State>, StorageError> {
        Ok(self.data.get(key).cloned())
    }
}

#[tokio::test]
async fn test_reader_through_arc_and_ref() {
    let state = State::new("k", Some(Value::bytes(vec![1])), Height(0)).unwrap();
    let reader = Arc::new(MapReader {
        data: HashMap::from([("k".to_string(), state.clone())]),
    });

    assert_eq!(reader.state("k").await.unwrap(), Some(state.clone()));
    let dyn_reader: Arc<dyn StateReader> = reader.clone();
    assert_eq!(dyn_reader.state("k").await.unwrap(), Some(state));
    assert_eq!((&*reader).state("missing").await.unwrap(), None);
}
