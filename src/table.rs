//! Open-addressed hash table with linear probing and tombstones (spec.md §4.2).
//! Used for globals, instance/class fields, class method tables, and the
//! string intern set.

use crate::constants::TABLE_MAX_LOAD;
use crate::objects::ObjectString;
use crate::value::{hash_value, make_empty_value, values_equal, Value};

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Tombstone,
    Occupied(Value, Value),
}

pub struct Table {
    entries: Vec<Slot>,
    count: usize, // occupied entries, not counting tombstones
}

impl Table {
    pub fn new() -> Box<Table> {
        Box::new(Table {
            entries: Vec::new(),
            count: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the insertion/lookup slot index for `key`, following linear
    /// probing; if absent, returns the first empty-or-tombstone slot found
    /// (the first tombstone is reused preferentially, as in clox's table).
    fn find_slot_index(entries: &[Slot], capacity: usize, key: &Value) -> usize {
        let mut index = (hash_value(key) as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied(k, _) => {
                    if values_equal(k, key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.capacity() < 8 {
            8
        } else {
            self.capacity() * 2
        };
        let mut new_entries = vec![Slot::Empty; new_capacity];
        let mut new_count = 0;
        for slot in &self.entries {
            if let Slot::Occupied(k, v) = slot {
                let index = Self::find_slot_index(&new_entries, new_capacity, k);
                new_entries[index] = Slot::Occupied(*k, *v);
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    /// Inserts or updates `key`. Returns `true` if this added a brand-new key
    /// (lets the compiler reject duplicate definitions, spec.md §4.2).
    pub fn insert(&mut self, key: Value, value: Value) -> bool {
        if self.capacity() == 0 || (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD
        {
            self.grow();
        }
        let index = Self::find_slot_index(&self.entries, self.capacity(), &key);
        let is_new = !matches!(self.entries[index], Slot::Occupied(_, _));
        if is_new {
            self.count += 1;
        }
        self.entries[index] = Slot::Occupied(key, value);
        is_new
    }

    /// Returns `make_empty_value()` on miss, per spec.md §4.2.
    pub fn get(&self, key: &Value) -> Value {
        if self.capacity() == 0 {
            return make_empty_value();
        }
        let index = Self::find_slot_index(&self.entries, self.capacity(), key);
        match &self.entries[index] {
            Slot::Occupied(_, v) => *v,
            _ => make_empty_value(),
        }
    }

    pub fn contains(&self, key: &Value) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let index = Self::find_slot_index(&self.entries, self.capacity(), key);
        matches!(self.entries[index], Slot::Occupied(_, _))
    }

    pub fn remove(&mut self, key: &Value) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let index = Self::find_slot_index(&self.entries, self.capacity(), key);
        if matches!(self.entries[index], Slot::Occupied(_, _)) {
            self.entries[index] = Slot::Tombstone;
            self.count -= 1;
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().filter_map(|slot| match slot {
            Slot::Occupied(k, v) => Some((k, v)),
            _ => None,
        })
    }

    /// Looks up an interned string by content without allocating a `Value`,
    /// used by the allocator before a new `ObjectString` would be created.
    pub fn find_interned(&self, bytes: &str, hash: u32) -> Option<*mut ObjectString> {
        if self.capacity() == 0 {
            return None;
        }
        let mut index = (hash as usize) % self.capacity();
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Occupied(k, _) => unsafe {
                    if crate::value::is_string(k) {
                        let s = &*crate::value::as_string(k);
                        if s.hash == hash && s.content == bytes {
                            return Some(crate::value::as_string(k));
                        }
                    }
                },
                Slot::Tombstone => {}
            }
            index = (index + 1) % self.capacity();
        }
    }

    /// Removes entries whose key is an unmarked (white) string, run as part
    /// of the GC's string-table sweep (spec.md §4.3 phase 3) so the intern
    /// table cannot resurrect dead strings.
    pub fn remove_whites(&mut self) {
        for slot in &mut self.entries {
            if let Slot::Occupied(k, _) = slot {
                if crate::value::is_string(k) {
                    let marked = unsafe { (*crate::value::as_object(k)).mark };
                    if !marked {
                        *slot = Slot::Tombstone;
                        self.count -= 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::make_number_value;

    #[test]
    fn insert_distinguishes_added_from_replaced() {
        let mut table = Table::new();
        assert!(table.insert(make_number_value(1.0), make_number_value(10.0)));
        assert!(!table.insert(make_number_value(1.0), make_number_value(20.0)));
        assert_eq!(
            crate::value::as_number(&table.get(&make_number_value(1.0))),
            20.0
        );
    }

    #[test]
    fn missing_key_returns_empty() {
        let table = Table::new();
        assert!(crate::value::is_empty(&table.get(&make_number_value(42.0))));
    }

    #[test]
    fn grows_past_load_factor_without_losing_entries() {
        let mut table = Table::new();
        for i in 0..100 {
            table.insert(make_number_value(i as f64), make_number_value(i as f64 * 2.0));
        }
        assert_eq!(table.len(), 100);
        for i in 0..100 {
            assert_eq!(
                crate::value::as_number(&table.get(&make_number_value(i as f64))),
                i as f64 * 2.0
            );
        }
    }

    #[test]
    fn remove_then_reinsert_works_through_tombstone() {
        let mut table = Table::new();
        table.insert(make_number_value(1.0), make_number_value(1.0));
        table.insert(make_number_value(2.0), make_number_value(2.0));
        assert!(table.remove(&make_number_value(1.0)));
        assert!(!table.contains(&make_number_value(1.0)));
        assert!(table.insert(make_number_value(1.0), make_number_value(99.0)));
        assert_eq!(
            crate::value::as_number(&table.get(&make_number_value(1.0))),
            99.0
        );
    }
}
