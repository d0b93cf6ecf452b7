use std::collections::HashMap;

use super::object::{GcSize, Object, ObjectType};
use crate::value::{hash_value, values_equal, Value};

/// Ordered-key dictionary: an insertion-ordered key/value vector backed by a
/// hash index for lookup, giving deterministic iteration order (spec.md §3 "Dict").
#[repr(C)]
pub struct ObjectDict {
    pub object: Object,
    keys: Vec<Value>,
    values: Vec<Value>,
    index: HashMap<u64, Vec<usize>>,
}

impl ObjectDict {
    pub fn new() -> Box<ObjectDict> {
        Box::new(ObjectDict {
            object: Object::new(ObjectType::Dict),
            keys: Vec::new(),
            values: Vec::new(),
            index: HashMap::new(),
        })
    }

    fn find_slot(&self, key: &Value) -> Option<usize> {
        let h = hash_value(key);
        self.index.get(&h).and_then(|bucket| {
            bucket
                .iter()
                .copied()
                .find(|&i| values_equal(&self.keys[i], key))
        })
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.find_slot(key).map(|i| self.values[i])
    }

    /// Inserts or updates `key`. Returns `true` if this added a new key.
    pub fn insert(&mut self, key: Value, value: Value) -> bool {
        if let Some(i) = self.find_slot(&key) {
            self.values[i] = value;
            false
        } else {
            let slot = self.keys.len();
            let h = hash_value(&key);
            self.keys.push(key);
            self.values.push(value);
            self.index.entry(h).or_default().push(slot);
            true
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let slot = self.find_slot(key)?;
        self.keys.remove(slot);
        let removed = self.values.remove(slot);
        self.reindex();
        Some(removed)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, k) in self.keys.iter().enumerate() {
            self.index.entry(hash_value(k)).or_default().push(i);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates keys/values in insertion order (spec.md §8 round-trip law).
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.keys.iter().zip(self.values.iter())
    }

    /// The key at insertion-order position `index` (foreach over a dict
    /// visits keys, not key/value pairs). Distinct from `get`, which is a
    /// hash lookup by key, not by position.
    pub fn key_at(&self, index: usize) -> Option<Value> {
        self.keys.get(index).copied()
    }
}

impl GcSize for ObjectDict {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectDict>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
            + (self.keys.capacity() + self.values.capacity()) * std::mem::size_of::<Value>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::make_number_value;

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut dict = ObjectDict::new();
        for i in 0..5 {
            dict.insert(make_number_value(i as f64), make_number_value((i * 10) as f64));
        }
        let keys: Vec<f64> = dict
            .iter()
            .map(|(k, _)| crate::value::as_number(k))
            .collect();
        assert_eq!(keys, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn insert_replaces_existing_key_in_place() {
        let mut dict = ObjectDict::new();
        assert!(dict.insert(make_number_value(1.0), make_number_value(1.0)));
        assert!(!dict.insert(make_number_value(1.0), make_number_value(2.0)));
        assert_eq!(dict.len(), 1);
        assert_eq!(
            crate::value::as_number(&dict.get(&make_number_value(1.0)).unwrap()),
            2.0
        );
    }
}
