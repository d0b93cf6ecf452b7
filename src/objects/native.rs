use super::object::{GcSize, Object, ObjectType};
use crate::value::Value;
use crate::vm::Vm;

/// A native receives `(vm, argv)` and returns a value, or an `Err(message)`
/// that the VM turns into a raised runtime error (spec.md §6, §7).
pub type NativeFn = fn(&mut Vm, &[Value]) -> Result<Value, String>;

/// Opaque function pointer plus a display name (spec.md §3 "Native function").
#[repr(C)]
pub struct ObjectNative {
    pub object: Object,
    pub name: String,
    pub arity: u8,
    pub function: NativeFn,
}

impl ObjectNative {
    pub fn new(name: String, arity: u8, function: NativeFn) -> Box<ObjectNative> {
        Box::new(ObjectNative {
            object: Object::new(ObjectType::Native),
            name,
            arity,
            function,
        })
    }

    pub fn call(&self, vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
        (self.function)(vm, args)
    }
}

impl GcSize for ObjectNative {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectNative>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.name.capacity()
    }
}
