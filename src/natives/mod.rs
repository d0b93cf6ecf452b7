//! Native function layer: the invocation mechanism plus the handful of
//! built-ins the runtime itself depends on (spec.md §6 "Native functions").
//! Built-in *method* libraries (string/list/dict methods) are out of scope;
//! only `clock`, `type_of`, `assert`, and `len` are registered here.

use once_cell::sync::Lazy;
use std::time::Instant;

use crate::value::*;
use crate::vm::Vm;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn register_all(vm: &mut Vm) {
    vm.define_native("clock", 0, clock);
    vm.define_native("type_of", 1, type_of);
    vm.define_native("assert", 1, assert_native);
    vm.define_native("len", 1, len);
}

fn clock(_vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    Ok(make_number_value(START_TIME.elapsed().as_secs_f64()))
}

fn type_of(_vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    let value = args[0];
    let name = if is_nil(&value) {
        "nil"
    } else if is_bool(&value) {
        "bool"
    } else if is_number(&value) {
        "number"
    } else if is_string(&value) {
        "string"
    } else if is_list(&value) {
        "list"
    } else if is_dict(&value) {
        "dict"
    } else if is_function(&value) || is_closure(&value) || is_bound_method(&value) || is_native(&value) {
        "function"
    } else if is_class(&value) {
        "class"
    } else if is_instance(&value) {
        "instance"
    } else {
        "empty"
    };
    Ok(make_string_value(_vm.heap_mut().alloc_string(name)))
}

fn assert_native(_vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    if is_falsey(&args[0]) {
        return Err("Assertion failed.".to_string());
    }
    Ok(make_nil_value())
}

fn len(_vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    let value = args[0];
    if is_string(&value) {
        let s = unsafe { &*as_string(&value) };
        Ok(make_number_value(s.content.chars().count() as f64))
    } else if is_list(&value) {
        let list = unsafe { &*as_list(&value) };
        Ok(make_number_value(list.items.len() as f64))
    } else if is_dict(&value) {
        let dict = unsafe { &*as_dict(&value) };
        Ok(make_number_value(dict.len() as f64))
    } else {
        Err("len() expects a string, list, or dict.".to_string())
    }
}
