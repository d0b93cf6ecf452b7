use super::class::ObjectClass;
use super::object::{GcSize, Object, ObjectType};
use crate::table::Table;

/// A class pointer plus a per-instance field table, seeded from the class's
/// field defaults at construction (spec.md §3 "Instance", §3 invariants).
#[repr(C)]
pub struct ObjectInstance {
    pub object: Object,
    pub class: *mut ObjectClass,
    pub fields: Box<Table>,
}

impl ObjectInstance {
    pub fn new(class: *mut ObjectClass) -> Box<ObjectInstance> {
        let fields = Table::new();
        Box::new(ObjectInstance {
            object: Object::new(ObjectType::Instance),
            class,
            fields,
        })
    }
}

impl GcSize for ObjectInstance {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectInstance>()
    }
    fn deep_size(&self) -> usize {
        self.shallow_size()
    }
}
