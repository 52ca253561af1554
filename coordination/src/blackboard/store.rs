//! Shared key-value store with per-key merge reducers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::reducers::Reducer;

/// Shared reference to Blackboard
pub type SharedBlackboard = Arc<Blackboard>;

#[derive(Default)]
struct BoardState {
    data: HashMap<String, Value>,
    reducers: HashMap<String, Arc<dyn Reducer>>,
}

/// Process-wide store that agents read and merge into.
///
/// Every operation takes a single internal lock, so two concurrent merges
/// on the same key are applied one after the other and neither is lost.
/// A reducer that panics leaves the stored value as it was.
#[derive(Default)]
pub struct Blackboard {
    state: RwLock<BoardState>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this blackboard
    pub fn shared(self) -> SharedBlackboard {
        Arc::new(self)
    }

    fn read(&self) -> RwLockReadGuard<'_, BoardState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoardState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite a key unconditionally.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.write().data.insert(key.into(), value);
    }

    /// Stored value, or `default` when the key is absent.
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.read().data.get(key).cloned().unwrap_or(default)
    }

    pub fn get_opt(&self, key: &str) -> Option<Value> {
        self.read().data.get(key).cloned()
    }

    /// Deserialize a stored value. `None` when absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_opt(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().data.contains_key(key)
    }

    /// Install or replace the reducer for `key`, returning the previous one.
    ///
    /// The stored value is not re-merged.
    pub fn register_reducer(
        &self,
        key: impl Into<String>,
        reducer: impl Reducer + 'static,
    ) -> Option<Arc<dyn Reducer>> {
        self.register_shared_reducer(key, Arc::new(reducer))
    }

    pub fn register_shared_reducer(
        &self,
        key: impl Into<String>,
        reducer: Arc<dyn Reducer>,
    ) -> Option<Arc<dyn Reducer>> {
        let key = key.into();
        debug!(key, reducer = reducer.name(), "Reducer registered");
        self.write().reducers.insert(key, reducer)
    }

    /// Install a reducer only if the key has none. Returns whether it was installed.
    pub fn register_reducer_if_absent(
        &self,
        key: impl Into<String>,
        reducer: impl Reducer + 'static,
    ) -> bool {
        let mut state = self.write();
        let key = key.into();
        if state.reducers.contains_key(&key) {
            return false;
        }
        state.reducers.insert(key, Arc::new(reducer));
        true
    }

    /// Drop the reducer for `key`; later merges overwrite.
    pub fn remove_reducer(&self, key: &str) -> Option<Arc<dyn Reducer>> {
        self.write().reducers.remove(key)
    }

    pub fn reducer_name(&self, key: &str) -> Option<String> {
        self.read()
            .reducers
            .get(key)
            .map(|reducer| reducer.name().to_string())
    }

    /// Fold `value` into `key`.
    ///
    /// With a reducer registered and a value present, stores
    /// `reducer(current, value)`; otherwise behaves like [`Blackboard::set`].
    /// Returns the value now stored.
    pub fn merge(&self, key: impl Into<String>, value: Value) -> Value {
        let key = key.into();
        let mut state = self.write();

        let merged = match (state.data.get(&key), state.reducers.get(&key)) {
            (Some(current), Some(reducer)) => reducer.merge(current, value),
            _ => value,
        };

        state.data.insert(key, merged.clone());
        merged
    }

    /// Independent copy of every key and value.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.read().data.clone()
    }

    /// Copy of the entries under `prefix`, with the prefix stripped.
    pub fn snapshot_prefix(&self, prefix: &str) -> HashMap<String, Value> {
        self.read()
            .data
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().data.is_empty()
    }
}
