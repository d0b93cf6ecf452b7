use super::object::{GcSize, Object, ObjectType};
use crate::value::Value;

/// Dynamic array of values with amortized O(1) append (spec.md §3 "List").
#[repr(C)]
pub struct ObjectList {
    pub object: Object,
    pub items: Vec<Value>,
}

impl ObjectList {
    pub fn new() -> Box<ObjectList> {
        Box::new(ObjectList {
            object: Object::new(ObjectType::List),
            items: Vec::new(),
        })
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn get(&self, index: i64) -> Option<Value> {
        self.resolve_index(index).map(|i| self.items[i])
    }

    pub fn set(&mut self, index: i64, value: Value) -> bool {
        match self.resolve_index(index) {
            Some(i) => {
                self.items[i] = value;
                true
            }
            None => false,
        }
    }

    /// Negative indices count from the end, matching common scripting-language subscript semantics.
    fn resolve_index(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let normalized = if index < 0 { index + len } else { index };
        if normalized < 0 || normalized >= len {
            None
        } else {
            Some(normalized as usize)
        }
    }
}

impl GcSize for ObjectList {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectList>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.items.capacity() * std::mem::size_of::<Value>()
    }
}
