use super::object::{GcSize, Object, ObjectType};
use super::function::ObjectFunction;
use super::upvalue::ObjectUpvalue;

/// A function paired with its resolved upvalues (spec.md §3 "Closure").
#[repr(C)]
pub struct ObjectClosure {
    pub object: Object,
    pub function: *mut ObjectFunction,
    pub upvalues: Vec<*mut ObjectUpvalue>,
}

impl ObjectClosure {
    pub fn new(function: *mut ObjectFunction, upvalue_count: usize) -> Box<ObjectClosure> {
        Box::new(ObjectClosure {
            object: Object::new(ObjectType::Closure),
            function,
            upvalues: vec![std::ptr::null_mut(); upvalue_count],
        })
    }

    pub fn function(&self) -> &ObjectFunction {
        unsafe { &*self.function }
    }
}

impl GcSize for ObjectClosure {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectClosure>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.upvalues.capacity() * std::mem::size_of::<*mut ObjectUpvalue>()
    }
}
