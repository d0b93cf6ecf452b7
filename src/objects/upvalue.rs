use super::object::{GcSize, Object, ObjectType};
use crate::value::{make_nil_value, Value};

/// A captured variable: OPEN while its source stack slot is still live, CLOSED
/// once that slot has been reused (spec.md §3 "Upvalue"). The OPEN -> CLOSED
/// transition is one-way.
#[repr(C)]
pub struct ObjectUpvalue {
    pub object: Object,
    pub location: *mut Value,
    pub closed: Value,
    /// Links open upvalues in descending-stack-address order (spec.md §3 invariant).
    pub next_open: *mut ObjectUpvalue,
}

impl ObjectUpvalue {
    pub fn new(slot: *mut Value) -> Box<ObjectUpvalue> {
        Box::new(ObjectUpvalue {
            object: Object::new(ObjectType::Upvalue),
            location: slot,
            closed: make_nil_value(),
            next_open: std::ptr::null_mut(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.location != &self.closed as *const Value as *mut Value
    }

    /// Copies the current value out of the stack slot into `closed` and
    /// redirects `location` to point at that owned copy. One-way.
    pub fn close(&mut self) {
        debug_assert!(self.is_open(), "closing an already-closed upvalue");
        unsafe {
            self.closed = *self.location;
        }
        self.location = &mut self.closed as *mut Value;
    }

    pub fn get(&self) -> Value {
        unsafe { *self.location }
    }

    pub fn set(&mut self, value: Value) {
        unsafe {
            *self.location = value;
        }
    }
}

impl GcSize for ObjectUpvalue {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectUpvalue>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
    }
}
