use super::object::{GcSize, Object, ObjectType};
use crate::chunk::Chunk;
use crate::value::Value;

/// Immutable bytecode blob plus arity metadata (spec.md §3 "Function").
#[repr(C)]
pub struct ObjectFunction {
    pub object: Object,
    pub arity: u8,
    pub is_variadic: bool,
    pub upvalue_count: usize,
    pub chunk: Box<Chunk>,
    /// `None` for the implicit top-level script function.
    pub name: Option<String>,
}

impl ObjectFunction {
    pub fn new(arity: u8, name: String) -> Box<ObjectFunction> {
        Box::new(ObjectFunction {
            object: Object::new(ObjectType::Function),
            arity,
            is_variadic: false,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name: if name.is_empty() { None } else { Some(name) },
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<script>")
    }
}

impl GcSize for ObjectFunction {
    fn shallow_size(&self) -> usize {
        std::mem::size_of::<ObjectFunction>()
    }
    fn deep_size(&self) -> usize {
        let name_bytes = self.name.as_ref().map(|n| n.capacity()).unwrap_or(0);
        let chunk_bytes = self.chunk.code.capacity()
            + self.chunk.lines.capacity() * std::mem::size_of::<u32>()
            + self.chunk.constants.capacity() * std::mem::size_of::<Value>();
        self.shallow_size() + name_bytes + chunk_bytes
    }
}
