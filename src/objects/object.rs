use std::mem::size_of;

use super::{
    bound_method::ObjectBoundMethod, class::ObjectClass, closure::ObjectClosure,
    dict::ObjectDict, function::ObjectFunction, instance::ObjectInstance, list::ObjectList,
    native::ObjectNative, string::ObjectString, upvalue::ObjectUpvalue,
};

#[repr(u8)]
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum ObjectType {
    String,
    List,
    Dict,
    Function,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
    Native,
}

/// Header shared by every heap object (spec.md §3 "Heap object header").
///
/// Objects are only ever created through the allocator in [`crate::heap::Heap`],
/// which prepends them to the allocation list via `next`.
#[repr(C)]
pub struct Object {
    pub obj_type: ObjectType,
    pub mark: bool,
    pub next: *mut Object,
}

impl Object {
    pub fn new(obj_type: ObjectType) -> Self {
        Object {
            obj_type,
            mark: false,
            next: std::ptr::null_mut(),
        }
    }

    #[inline]
    pub unsafe fn as_string(&self) -> &ObjectString {
        debug_assert!(matches!(self.obj_type, ObjectType::String));
        &*(self as *const _ as *const ObjectString)
    }
    #[inline]
    pub unsafe fn as_string_mut(&mut self) -> &mut ObjectString {
        debug_assert!(matches!(self.obj_type, ObjectType::String));
        &mut *(self as *mut _ as *mut ObjectString)
    }
    #[inline]
    pub unsafe fn as_list(&self) -> &ObjectList {
        debug_assert!(matches!(self.obj_type, ObjectType::List));
        &*(self as *const _ as *const ObjectList)
    }
    #[inline]
    pub unsafe fn as_list_mut(&mut self) -> &mut ObjectList {
        debug_assert!(matches!(self.obj_type, ObjectType::List));
        &mut *(self as *mut _ as *mut ObjectList)
    }
    #[inline]
    pub unsafe fn as_dict(&self) -> &ObjectDict {
        debug_assert!(matches!(self.obj_type, ObjectType::Dict));
        &*(self as *const _ as *const ObjectDict)
    }
    #[inline]
    pub unsafe fn as_dict_mut(&mut self) -> &mut ObjectDict {
        debug_assert!(matches!(self.obj_type, ObjectType::Dict));
        &mut *(self as *mut _ as *mut ObjectDict)
    }
    #[inline]
    pub unsafe fn as_function(&self) -> &ObjectFunction {
        debug_assert!(matches!(self.obj_type, ObjectType::Function));
        &*(self as *const _ as *const ObjectFunction)
    }
    #[inline]
    pub unsafe fn as_function_mut(&mut self) -> &mut ObjectFunction {
        debug_assert!(matches!(self.obj_type, ObjectType::Function));
        &mut *(self as *mut _ as *mut ObjectFunction)
    }
    #[inline]
    pub unsafe fn as_closure(&self) -> &ObjectClosure {
        debug_assert!(matches!(self.obj_type, ObjectType::Closure));
        &*(self as *const _ as *const ObjectClosure)
    }
    #[inline]
    pub unsafe fn as_closure_mut(&mut self) -> &mut ObjectClosure {
        debug_assert!(matches!(self.obj_type, ObjectType::Closure));
        &mut *(self as *mut _ as *mut ObjectClosure)
    }
    #[inline]
    pub unsafe fn as_upvalue(&self) -> &ObjectUpvalue {
        debug_assert!(matches!(self.obj_type, ObjectType::Upvalue));
        &*(self as *const _ as *const ObjectUpvalue)
    }
    #[inline]
    pub unsafe fn as_upvalue_mut(&mut self) -> &mut ObjectUpvalue {
        debug_assert!(matches!(self.obj_type, ObjectType::Upvalue));
        &mut *(self as *mut _ as *mut ObjectUpvalue)
    }
    #[inline]
    pub unsafe fn as_class(&self) -> &ObjectClass {
        debug_assert!(matches!(self.obj_type, ObjectType::Class));
        &*(self as *const _ as *const ObjectClass)
    }
    #[inline]
    pub unsafe fn as_class_mut(&mut self) -> &mut ObjectClass {
        debug_assert!(matches!(self.obj_type, ObjectType::Class));
        &mut *(self as *mut _ as *mut ObjectClass)
    }
    #[inline]
    pub unsafe fn as_instance(&self) -> &ObjectInstance {
        debug_assert!(matches!(self.obj_type, ObjectType::Instance));
        &*(self as *const _ as *const ObjectInstance)
    }
    #[inline]
    pub unsafe fn as_instance_mut(&mut self) -> &mut ObjectInstance {
        debug_assert!(matches!(self.obj_type, ObjectType::Instance));
        &mut *(self as *mut _ as *mut ObjectInstance)
    }
    #[inline]
    pub unsafe fn as_bound_method(&self) -> &ObjectBoundMethod {
        debug_assert!(matches!(self.obj_type, ObjectType::BoundMethod));
        &*(self as *const _ as *const ObjectBoundMethod)
    }
    #[inline]
    pub unsafe fn as_native(&self) -> &ObjectNative {
        debug_assert!(matches!(self.obj_type, ObjectType::Native));
        &*(self as *const _ as *const ObjectNative)
    }

    /// Bytes this object is responsible for, used to keep `bytes_allocated` in sync
    /// with the currently-live allocation set (spec.md §3 invariant).
    pub unsafe fn deep_size(&self) -> usize {
        match self.obj_type {
            ObjectType::String => (*(self as *const _ as *const ObjectString)).deep_size(),
            ObjectType::List => (*(self as *const _ as *const ObjectList)).deep_size(),
            ObjectType::Dict => (*(self as *const _ as *const ObjectDict)).deep_size(),
            ObjectType::Function => (*(self as *const _ as *const ObjectFunction)).deep_size(),
            ObjectType::Closure => (*(self as *const _ as *const ObjectClosure)).deep_size(),
            ObjectType::Upvalue => (*(self as *const _ as *const ObjectUpvalue)).deep_size(),
            ObjectType::Class => (*(self as *const _ as *const ObjectClass)).deep_size(),
            ObjectType::Instance => (*(self as *const _ as *const ObjectInstance)).deep_size(),
            ObjectType::BoundMethod => {
                (*(self as *const _ as *const ObjectBoundMethod)).deep_size()
            }
            ObjectType::Native => (*(self as *const _ as *const ObjectNative)).deep_size(),
        }
    }
}

/// Bytes owned by a heap-managed structure, for `bytes_allocated` accounting.
/// References to other GC objects are not traversed (they are charged to their
/// own allocation), only locally owned buffers (`Vec`/`String` capacity etc).
pub trait GcSize {
    fn shallow_size(&self) -> usize;
    fn deep_size(&self) -> usize;
}

#[inline]
pub fn base_header_size() -> usize {
    size_of::<Object>()
}

#[cfg(feature = "debug_trace_object")]
pub(crate) mod debug_feature {
    use super::*;

    pub fn trace_free(obj: &Object) {
        match obj.obj_type {
            ObjectType::String => unsafe {
                eprintln!("free String '{}'", obj.as_string().content);
            },
            ObjectType::Function => unsafe {
                eprintln!("free Function '{}'", obj.as_function().name.as_deref().unwrap_or("<script>"));
            },
            other => eprintln!("free {:?}", other),
        }
    }
}

#[cfg(not(feature = "debug_trace_object"))]
pub(crate) mod debug_feature {
    use super::Object;
    pub fn trace_free(_obj: &Object) {}
}
