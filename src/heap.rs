//! Allocator and string interner (spec.md §3 "Heap object header", §4.3 allocation).
//!
//! Every heap object is boxed, leaked via `Box::into_raw`, and threaded onto a
//! singly-linked allocation list through its own `Object.next` field — the GC
//! sweep phase walks this list rather than a side table (spec.md §4.3). The
//! `Heap` does not itself decide when to collect; it only tracks
//! `bytes_allocated`/`next_gc` so the VM can call into [`crate::gc`] at a
//! safepoint once the threshold is crossed.

use crate::constants::{DEFAULT_NEXT_GC, GC_GROWTH_FACTOR};
use crate::objects::object::{Object, ObjectType};
use crate::objects::{
    ObjectBoundMethod, ObjectClass, ObjectClosure, ObjectDict, ObjectFunction, ObjectInstance,
    ObjectList, ObjectNative, ObjectString, ObjectUpvalue,
};
use crate::table::Table;
use crate::value::{make_string_value, Value};

pub struct Heap {
    objects: *mut Object,
    pub bytes_allocated: usize,
    pub next_gc: usize,
    pub strings: Box<Table>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            objects: std::ptr::null_mut(),
            bytes_allocated: 0,
            next_gc: DEFAULT_NEXT_GC,
            strings: Table::new(),
        }
    }

    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    pub fn grow_threshold(&mut self) {
        self.next_gc = self.bytes_allocated * GC_GROWTH_FACTOR;
    }

    /// Head of the allocation list, for the GC sweep to walk.
    pub fn objects_head(&self) -> *mut Object {
        self.objects
    }

    pub fn set_objects_head(&mut self, head: *mut Object) {
        self.objects = head;
    }

    fn link<T>(&mut self, boxed: Box<T>, obj_type: ObjectType, size: usize) -> *mut T
    where
        T: HasHeader,
    {
        let _ = obj_type;
        let ptr = Box::into_raw(boxed);
        unsafe {
            (*ptr).header_mut().next = self.objects;
            self.objects = (*ptr).header_mut() as *mut Object;
        }
        self.bytes_allocated += size;
        #[cfg(feature = "gc_debug")]
        eprintln!(
            "[gc-debug] alloc {:p} size={} total={}",
            ptr, size, self.bytes_allocated
        );
        ptr
    }

    /// Interns `content`, returning the existing `ObjectString` if one with the
    /// same bytes already lives in the string table (spec.md §4.3 interning).
    pub fn alloc_string(&mut self, content: &str) -> *mut ObjectString {
        let hash = crate::objects::string::fnv1a_hash(content.as_bytes());
        if let Some(existing) = self.strings.find_interned(content, hash) {
            return existing;
        }
        let boxed = ObjectString::new(content);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        let ptr = self.link(boxed, ObjectType::String, size);
        self.strings
            .insert(make_string_value(ptr), crate::value::make_nil_value());
        ptr
    }

    pub fn alloc_list(&mut self) -> *mut ObjectList {
        let boxed = ObjectList::new();
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::List, size)
    }

    pub fn alloc_dict(&mut self) -> *mut ObjectDict {
        let boxed = ObjectDict::new();
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Dict, size)
    }

    pub fn alloc_function(&mut self, arity: u8, name: String) -> *mut ObjectFunction {
        let boxed = ObjectFunction::new(arity, name);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Function, size)
    }

    /// Moves a fully-compiled, free-standing function (built by the compiler
    /// before the heap is involved) onto the allocation list, preserving its
    /// chunk and arity metadata.
    pub fn adopt_function(&mut self, function: Box<ObjectFunction>) -> *mut ObjectFunction {
        let ptr = self.alloc_function(function.arity, function.name.clone().unwrap_or_default());
        unsafe {
            (*ptr).is_variadic = function.is_variadic;
            (*ptr).upvalue_count = function.upvalue_count;
            (*ptr).chunk = function.chunk;
        }
        ptr
    }

    pub fn alloc_closure(&mut self, function: *mut ObjectFunction) -> *mut ObjectClosure {
        let upvalue_count = unsafe { (*function).upvalue_count };
        let boxed = ObjectClosure::new(function, upvalue_count);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Closure, size)
    }

    pub fn alloc_upvalue(&mut self, slot: *mut Value) -> *mut ObjectUpvalue {
        let boxed = ObjectUpvalue::new(slot);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Upvalue, size)
    }

    pub fn alloc_class(&mut self, name: String) -> *mut ObjectClass {
        let boxed = ObjectClass::new(name);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Class, size)
    }

    /// Allocates an instance, shallow-copying the class's field defaults into
    /// its own field table (spec.md §3 "Instance" invariant).
    pub fn alloc_instance(&mut self, class: *mut ObjectClass) -> *mut ObjectInstance {
        let mut boxed = ObjectInstance::new(class);
        unsafe {
            for (k, v) in (*class).field_defaults.iter() {
                boxed.fields.insert(*k, *v);
            }
        }
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Instance, size)
    }

    pub fn alloc_bound_method(
        &mut self,
        receiver: Value,
        method: *mut ObjectClosure,
    ) -> *mut ObjectBoundMethod {
        let boxed = ObjectBoundMethod::new(receiver, method);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::BoundMethod, size)
    }

    pub fn alloc_native(
        &mut self,
        name: String,
        arity: u8,
        function: crate::objects::native::NativeFn,
    ) -> *mut ObjectNative {
        let boxed = ObjectNative::new(name, arity, function);
        let size = {
            use crate::objects::object::GcSize;
            boxed.deep_size()
        };
        self.link(boxed, ObjectType::Native, size)
    }

    /// Frees every remaining object unconditionally, for VM shutdown.
    pub fn free_all(&mut self) {
        let mut current = self.objects;
        while !current.is_null() {
            unsafe {
                let next = (*current).next;
                #[cfg(feature = "debug_trace_object")]
                crate::objects::object::debug_feature::trace_free(&*current);
                drop(Box::from_raw(current));
                current = next;
            }
        }
        self.objects = std::ptr::null_mut();
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.free_all();
    }
}

/// Every concrete object type starts with an `Object` header at offset 0, so
/// the allocator can thread it onto the allocation list without knowing the
/// concrete type.
trait HasHeader {
    fn header_mut(&mut self) -> &mut Object;
}

macro_rules! impl_has_header {
    ($t:ty) => {
        impl HasHeader for $t {
            fn header_mut(&mut self) -> &mut Object {
                &mut self.object
            }
        }
    };
}

impl_has_header!(ObjectString);
impl_has_header!(ObjectList);
impl_has_header!(ObjectDict);
impl_has_header!(ObjectFunction);
impl_has_header!(ObjectClosure);
impl_has_header!(ObjectUpvalue);
impl_has_header!(ObjectClass);
impl_has_header!(ObjectInstance);
impl_has_header!(ObjectBoundMethod);
impl_has_header!(ObjectNative);
