//! Dedup Dictionary
//!
//! Replaces repeated low-cardinality strings (source names, devices) with
//! compact ids `_0`, `_1`, ... assigned in first-occurrence order.

use std::collections::HashMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Compact id handed out by a [`DedupDictionary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupId(pub usize);

impl fmt::Display for DedupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

impl Serialize for DedupId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Per-table bijection between original strings and their ids
#[derive(Debug, Clone, Default)]
pub struct DedupDictionary {
    /// value -> id
    index: HashMap<String, DedupId>,
    /// id -> value
    values: Vec<String>,
}

impl DedupDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `value`, assigning the next one on first sight
    pub fn lookup(&mut self, value: &str) -> DedupId {
        if let Some(id) = self.index.get(value) {
            return *id;
        }
        let id = DedupId(self.values.len());
        self.index.insert(value.to_string(), id);
        self.values.push(value.to_string());
        id
    }

    /// Original value for an id
    pub fn resolve(&self, id: DedupId) -> Option<&str> {
        self.values.get(id.0).map(String::as_str)
    }

    /// Id already assigned to `value`, if any
    pub fn get(&self, value: &str) -> Option<DedupId> {
        self.index.get(value).copied()
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether `key` is the string form of an id this dictionary handed out
    fn is_assigned_id(&self, key: &str) -> bool {
        key.strip_prefix('_')
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| n < self.values.len() && DedupId(n).to_string() == key)
    }

    /// `(id, value)` pairs in id order
    pub fn entries(&self) -> impl Iterator<Item = (DedupId, &str)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (DedupId(i), v.as_str()))
    }
}

/// Serializes as one object holding both directions: `value -> id` and
/// `id -> value`. Every reverse entry is written; a forward entry is left out
/// when its value is itself spelled like an assigned id, so no key appears
/// twice and ids always decode.
impl Serialize for DedupDictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (id, value) in self.entries() {
            if !self.is_assigned_id(value) {
                map.serialize_entry(value, &id)?;
            }
            map.serialize_entry(&id.to_string(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_dense_in_first_occurrence_order() {
        let mut dict = DedupDictionary::new();
        assert_eq!(dict.lookup("Watch"), DedupId(0));
        assert_eq!(dict.lookup("iPhone"), DedupId(1));
        assert_eq!(dict.lookup("Watch"), DedupId(0));
        assert_eq!(dict.lookup("Scale"), DedupId(2));
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn test_bijection() {
        let mut dict = DedupDictionary::new();
        for v in ["a", "b", "a", "c", "b"] {
            let id = dict.lookup(v);
            assert_eq!(dict.resolve(id), Some(v));
            assert_eq!(dict.get(v), Some(id));
        }
        assert_eq!(dict.resolve(DedupId(3)), None);
    }

    #[test]
    fn test_value_that_looks_like_an_id() {
        let mut dict = DedupDictionary::new();
        assert_eq!(dict.lookup("_1"), DedupId(0));
        assert_eq!(dict.lookup("x"), DedupId(1));
        assert_eq!(dict.lookup("_1"), DedupId(0));
        assert_eq!(dict.resolve(DedupId(1)), Some("x"));
    }

    #[test]
    fn test_serializes_both_directions() {
        let mut dict = DedupDictionary::new();
        dict.lookup("Watch");
        dict.lookup("iPhone");
        let json = serde_json::to_value(&dict).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Watch": "_0", "_0": "Watch", "iPhone": "_1", "_1": "iPhone"})
        );
    }

    #[test]
    fn test_id_spelled_value_keeps_reverse_entries() {
        let mut dict = DedupDictionary::new();
        dict.lookup("Watch");
        dict.lookup("_0");
        let json = serde_json::to_value(&dict).unwrap();
        assert_eq!(json["_0"], "Watch");
        assert_eq!(json["_1"], "_0");
        assert_eq!(json["Watch"], "_0");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_serialized_keys_unique() {
        let mut dict = DedupDictionary::new();
        for v in ["_1", "a", "_01", "_7"] {
            dict.lookup(v);
        }
        let text = serde_json::to_string(&dict).unwrap();
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text).unwrap();
        // "_1" is an assigned id, the others are plain values
        assert_eq!(map.len(), 7);
        assert_eq!(text.matches("\"_1\":").count(), 1);
        assert_eq!(map["_1"], "a");
    }

    #[test]
    fn test_display() {
        assert_eq!(DedupId(12).to_string(), "_12");
    }
}
