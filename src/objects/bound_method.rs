use super::closure::ObjectClosure;
use super::object::{GcSize, Object, ObjectType};
use crate::value::Value;

/// `obj.method` captured without an immediate call: a receiver value paired
/// with the callable it was bound from (spec.md §3 "Bound method").
#[repr(C)]
pub struct ObjectBoundMethod {
    pub object: Object,
    pub receiver: Value,
    pub method: *mut ObjectClosure,
}

impl ObjectBoundMethod {
    pub fn new(receiver: Value, method: *mut ObjectClosure) -> Box<ObjectBoundMethod> {
        Box::new(ObjectBoundMethod {
            object: Object::new(ObjectType::BoundMethod),
            receiver,
            method,
        })
    }
}

impl GcSize for ObjectBoundMethod {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectBoundMethod>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
    }
}
