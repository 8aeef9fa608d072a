//! Thread-safe string-keyed attribute store.
//!
//! Values are JSON values so attributes can carry configuration-derived
//! settings in and published results out, and be exported as one object.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Per-component attribute map.
#[derive(Debug, Default)]
pub struct Attributes {
    map: RwLock<BTreeMap<String, Value>>,
}

impl Attributes {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn store(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.map.write().insert(key.into(), value.into());
    }

    /// Serializes `value` and stores it under `key`.
    pub fn store_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.map.write().insert(key.into(), value);
        Ok(())
    }

    /// Returns a copy of the value under `key`.
    pub fn load(&self, key: &str) -> Option<Value> {
        self.map.read().get(key).cloned()
    }

    /// Returns the existing value and `true`, or stores `value` and returns it with `false`.
    pub fn load_or_store(&self, key: impl Into<String>, value: impl Into<Value>) -> (Value, bool) {
        let mut map = self.map.write();
        match map.entry(key.into()) {
            std::collections::btree_map::Entry::Occupied(e) => (e.get().clone(), true),
            std::collections::btree_map::Entry::Vacant(e) => (e.insert(value.into()).clone(), false),
        }
    }

    /// Removes `key` and returns its value.
    pub fn load_and_delete(&self, key: &str) -> Option<Value> {
        self.map.write().remove(key)
    }

    /// Removes `key`.
    pub fn delete(&self, key: &str) {
        self.map.write().remove(key);
    }

    /// Calls `f` for each entry in key order until it returns `false`.
    ///
    /// Iterates a snapshot, so `f` may touch the store.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Value) -> bool,
    {
        let snapshot = self.map.read().clone();
        for (k, v) in &snapshot {
            if !f(k, v) {
                break;
            }
        }
    }

    /// Loads `key` as `T`, or returns `default` when missing or of another shape.
    pub fn load_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.map
            .read()
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
            .unwrap_or(default)
    }

    /// Number of stored attributes.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Exports every attribute as one JSON object.
    pub fn export(&self) -> Map<String, Value> {
        self.map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_load_and_typed_defaults() {
        let attrs = Attributes::new();
        attrs.store("bytes", 42u64);
        attrs.store("name", "copy");

        assert_eq!(attrs.load("bytes"), Some(json!(42)));
        assert_eq!(attrs.load_or::<u64>("bytes", 0), 42);
        assert_eq!(attrs.load_or::<u64>("name", 7), 7);
        assert_eq!(attrs.load_or::<String>("missing", "x".into()), "x");
    }

    #[test]
    fn load_or_store_keeps_first() {
        let attrs = Attributes::new();
        assert_eq!(attrs.load_or_store("k", 1), (json!(1), false));
        assert_eq!(attrs.load_or_store("k", 2), (json!(1), true));
        assert_eq!(attrs.load_and_delete("k"), Some(json!(1)));
        assert!(attrs.is_empty());
    }

    #[test]
    fn range_stops_early_and_export() {
        let attrs = Attributes::new();
        attrs.store("a", 1);
        attrs.store("b", 2);
        attrs.store("c", 3);

        let mut seen = Vec::new();
        attrs.range(|k, _| {
            seen.push(k.to_string());
            k != "b"
        });
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(Value::Object(attrs.export()), json!({"a": 1, "b": 2, "c": 3}));
    }
}
