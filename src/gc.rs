//! Tracing mark-and-sweep collector (spec.md §4.3).
//!
//! Tri-color invariant is kept with the object header's `mark` bit standing in
//! for black/white and an explicit gray worklist, rather than the three
//! `HashSet`s an earlier draft of this VM used — the header already carries
//! `mark`, so a vector of pending pointers is all the gray set needs to be.
//! Sweep walks the allocation list through `Object.next` instead of a
//! side-table of live pointers.

use crate::heap::Heap;
use crate::objects::object::{Object, ObjectType};
use crate::objects::ObjectUpvalue;
use crate::table::Table;
use crate::value::{is_object, Value};

/// Everything the collector must treat as a root, gathered by the VM just
/// before it calls [`collect`].
pub struct Roots<'a> {
    pub stack: &'a [Value],
    pub globals: &'a Table,
    pub frame_closures: &'a [*mut Object],
    pub open_upvalues: *mut ObjectUpvalue,
}

#[derive(Default)]
pub struct GcStats {
    pub cycles: u64,
    pub total_freed_bytes: usize,
    pub last_freed_bytes: usize,
}

#[cfg(feature = "gc_debug")]
macro_rules! gc_trace { ($($arg:tt)*) => { eprintln!("[gc-trace] {}", format_args!($($arg)*)); } }
#[cfg(not(feature = "gc_debug"))]
macro_rules! gc_trace { ($($arg:tt)*) => {} }

/// Runs one full collection cycle and returns the number of bytes freed.
pub fn collect(heap: &mut Heap, roots: &Roots, stats: &mut GcStats) -> usize {
    let before = heap.bytes_allocated;
    let mut gray: Vec<*mut Object> = Vec::new();

    mark_roots(roots, &mut gray);
    trace_references(&mut gray);

    heap.strings.remove_whites();

    let freed = sweep(heap);

    heap.bytes_allocated = heap.bytes_allocated.saturating_sub(freed);
    heap.grow_threshold();

    stats.cycles += 1;
    stats.total_freed_bytes += freed;
    stats.last_freed_bytes = freed;
    gc_trace!(
        "cycle {} before={} freed={} after={} next_gc={}",
        stats.cycles,
        before,
        freed,
        heap.bytes_allocated,
        heap.next_gc
    );
    freed
}

fn mark_value(value: &Value, gray: &mut Vec<*mut Object>) {
    if is_object(value) {
        mark_object(crate::value::as_object(value), gray);
    }
}

fn mark_object(obj: *mut Object, gray: &mut Vec<*mut Object>) {
    if obj.is_null() {
        return;
    }
    unsafe {
        if (*obj).mark {
            return;
        }
        (*obj).mark = true;
    }
    gc_trace!("mark {:p}", obj);
    gray.push(obj);
}

fn mark_roots(roots: &Roots, gray: &mut Vec<*mut Object>) {
    for value in roots.stack {
        mark_value(value, gray);
    }
    for (_, value) in roots.globals.iter() {
        mark_value(value, gray);
    }
    for &closure in roots.frame_closures {
        mark_object(closure, gray);
    }
    let mut upvalue = roots.open_upvalues;
    while !upvalue.is_null() {
        mark_object(upvalue as *mut Object, gray);
        upvalue = unsafe { (*upvalue).next_open };
    }
}

fn trace_references(gray: &mut Vec<*mut Object>) {
    while let Some(obj) = gray.pop() {
        unsafe {
            blacken_object(obj, gray);
        }
    }
}

unsafe fn blacken_object(obj: *mut Object, gray: &mut Vec<*mut Object>) {
    match (*obj).obj_type {
        ObjectType::String | ObjectType::Native => {}
        ObjectType::List => {
            let list = (*obj).as_list();
            for item in &list.items {
                mark_value(item, gray);
            }
        }
        ObjectType::Dict => {
            let dict = (*obj).as_dict();
            for (k, v) in dict.iter() {
                mark_value(k, gray);
                mark_value(v, gray);
            }
        }
        ObjectType::Function => {
            let function = (*obj).as_function();
            for constant in function.chunk.iter_constants() {
                mark_value(constant, gray);
            }
        }
        ObjectType::Closure => {
            let closure = (*obj).as_closure();
            mark_object(closure.function as *mut Object, gray);
            for &upvalue in &closure.upvalues {
                mark_object(upvalue as *mut Object, gray);
            }
        }
        ObjectType::Upvalue => {
            let upvalue = (*obj).as_upvalue();
            mark_value(&upvalue.get(), gray);
        }
        ObjectType::Class => {
            let class = (*obj).as_class();
            for (_, v) in class.methods.iter() {
                mark_value(v, gray);
            }
            for (k, v) in class.field_defaults.iter() {
                mark_value(k, gray);
                mark_value(v, gray);
            }
            mark_object(class.initializer as *mut Object, gray);
            mark_object(class.superclass as *mut Object, gray);
        }
        ObjectType::Instance => {
            let instance = (*obj).as_instance();
            mark_object(instance.class as *mut Object, gray);
            for (k, v) in instance.fields.iter() {
                mark_value(k, gray);
                mark_value(v, gray);
            }
        }
        ObjectType::BoundMethod => {
            let bound = (*obj).as_bound_method();
            mark_value(&bound.receiver, gray);
            mark_object(bound.method as *mut Object, gray);
        }
    }
}

/// Walks the allocation list, freeing unmarked objects and clearing the mark
/// bit on survivors for the next cycle.
fn sweep(heap: &mut Heap) -> usize {
    let mut freed = 0usize;
    let mut previous: *mut Object = std::ptr::null_mut();
    let mut current = heap.objects_head();
    while !current.is_null() {
        unsafe {
            let next = (*current).next;
            if (*current).mark {
                (*current).mark = false;
                previous = current;
            } else {
                freed += (*current).deep_size();
                #[cfg(feature = "debug_trace_object")]
                crate::objects::object::debug_feature::trace_free(&*current);
                if previous.is_null() {
                    heap.set_objects_head(next);
                } else {
                    (*previous).next = next;
                }
                drop(Box::from_raw(current));
            }
            current = next;
        }
    }
    freed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    #[test]
    fn collects_unreachable_strings() {
        let mut heap = Heap::new();
        let keep = heap.alloc_string("keep");
        heap.alloc_string("drop-me-please-this-is-long-enough-to-not-collide");
        let stack = vec![crate::value::make_string_value(keep)];
        let globals = Table::new();
        let mut stats = GcStats::default();
        let roots = Roots {
            stack: &stack,
            globals: &globals,
            frame_closures: &[],
            open_upvalues: std::ptr::null_mut(),
        };
        collect(&mut heap, &roots, &mut stats);
        let mut count = 0;
        let mut current = heap.objects_head();
        while !current.is_null() {
            count += 1;
            current = unsafe { (*current).next };
        }
        assert_eq!(count, 1);
    }
}
