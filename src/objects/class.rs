use super::closure::ObjectClosure;
use super::object::{GcSize, Object, ObjectType};
use crate::table::Table;

/// Name, method table, field defaults, and a cached initializer (spec.md §3 "Class").
#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: String,
    pub methods: Box<Table>,
    pub field_defaults: Box<Table>,
    pub initializer: *mut ObjectClosure,
    pub superclass: *mut ObjectClass,
}

impl ObjectClass {
    pub fn new(name: String) -> Box<ObjectClass> {
        Box::new(ObjectClass {
            object: Object::new(ObjectType::Class),
            name,
            methods: Table::new(),
            field_defaults: Table::new(),
            initializer: std::ptr::null_mut(),
            superclass: std::ptr::null_mut(),
        })
    }
}

impl GcSize for ObjectClass {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectClass>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size() + self.name.capacity()
    }
}
