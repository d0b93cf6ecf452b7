//! Stack-based bytecode interpreter (spec.md §4.6 "Main loop"/"Call protocol").
//!
//! One `Vm` owns the value stack, call-frame stack, global table, heap, and
//! open-upvalue list; none of it is shared across threads or VM instances
//! (spec.md §5 "Shared resources").

use crate::call_frame::{CallFrame, ExceptionHandler};
use crate::chunk::OpCode;
use crate::compiler::Parser;
use crate::constants::{FRAMES_MAX, STACK_MAX};
use crate::gc::{self, GcStats, Roots};
use crate::heap::Heap;
use crate::objects::object::{Object, ObjectType};
use crate::objects::{ObjectClosure, ObjectUpvalue};
use crate::table::Table;
use crate::value::*;

/// VM configuration recognized at construction (spec.md §6 "VM configuration
/// fields recognized").
pub struct VmConfig {
    pub should_debug_stack: bool,
    pub should_print_bytecode: bool,
    pub next_gc: usize,
    pub is_repl: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            should_debug_stack: cfg!(feature = "debug_trace_execution"),
            should_print_bytecode: cfg!(feature = "debug_print_code"),
            next_gc: crate::constants::DEFAULT_NEXT_GC,
            is_repl: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Script run once at startup so `raise`/`catch` has a concrete class to
/// instantiate without hard-coding exceptions as a VM-native type (spec.md
/// §9 "Exceptions are plain class instances").
const PRELUDE_SOURCE: &str = "class Exception { @new(message) { this.message = message; } }";

pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Box<Table>,
    open_upvalues: *mut ObjectUpvalue,
    gc_stats: GcStats,
    config: VmConfig,
}

impl Vm {
    pub fn new(config: VmConfig) -> Box<Vm> {
        let mut vm = Box::new(Vm {
            heap: Heap::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: std::ptr::null_mut(),
            gc_stats: GcStats::default(),
            config,
        });
        vm.heap.next_gc = vm.config.next_gc;
        crate::natives::register_all(&mut vm);
        match vm.interpret(PRELUDE_SOURCE) {
            InterpretResult::Ok => {}
            other => panic!("prelude script failed to run: {:?}", other),
        }
        vm
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn define_native(&mut self, name: &str, arity: u8, function: crate::objects::NativeFn) {
        let native_ptr = self.heap.alloc_native(name.to_string(), arity, function);
        let name_value = self.string_value(name);
        self.globals.insert(name_value, make_native_value(native_ptr));
    }

    fn string_value(&mut self, text: &str) -> Value {
        make_string_value(self.heap.alloc_string(text))
    }

    // ---- embedding surface (spec.md §6) ----

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = {
            let mut parser = Parser::new(&mut self.heap);
            parser.compile(source)
        };
        let function = match function {
            Some(function) => function,
            None => return InterpretResult::CompileError,
        };
        let function_ptr = self.heap.adopt_function(function);
        let closure_ptr = self.heap.alloc_closure(function_ptr);
        let closure_value = make_closure_value(closure_ptr);
        self.push(closure_value);
        if let Err(message) = self.call_value(closure_value, 0) {
            eprintln!("{}", message);
            self.stack.clear();
            return InterpretResult::RuntimeError;
        }
        self.run()
    }

    pub fn push(&mut self, value: Value) {
        if self.stack.len() >= STACK_MAX {
            panic!("stack overflow: value stack exceeded STACK_MAX");
        }
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("pop on empty value stack")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // ---- main loop ----

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let byte = frame.chunk().read_from_offset(frame.ip).expect("ip past end of chunk");
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        self.current_frame().chunk().get_constant(index as usize)
    }

    fn read_string_constant(&mut self) -> Value {
        self.read_constant()
    }

    pub fn run(&mut self) -> InterpretResult {
        loop {
            if self.config.should_debug_stack {
                self.trace_stack();
            }

            let instruction = OpCode::from_byte(self.read_byte());
            match instruction {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(make_nil_value()),
                OpCode::True => self.push(make_bool_value(true)),
                OpCode::False => self.push(make_bool_value(false)),
                OpCode::Empty => self.push(make_empty_value()),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.current_frame().stack_base;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = self.read_string_constant();
                    let value = self.globals.get(&name);
                    if is_empty(&value) {
                        let message = format!("Undefined variable '{}'.", format_value(&name));
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                    self.push(value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    if self.globals.insert(name, value) {
                        self.globals.remove(&name);
                        let message = format!("Undefined variable '{}'.", format_value(&name));
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string_constant();
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.current_frame().closure;
                    let upvalue = unsafe { (*closure).upvalues[slot] };
                    self.push(unsafe { (*upvalue).get() });
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let closure = self.current_frame().closure;
                    let upvalue = unsafe { (*closure).upvalues[slot] };
                    let value = self.peek(0);
                    unsafe { (*upvalue).set(value) };
                }
                OpCode::GetProperty => {
                    let name = self.read_string_constant();
                    if let Err(message) = self.get_property(name) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string_constant();
                    if let Err(message) = self.set_property(name) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::GetSuper => {
                    let name = self.read_string_constant();
                    let superclass_value = self.pop();
                    let superclass = unsafe { as_class_object(&superclass_value) };
                    let receiver = self.pop();
                    match self.bind_method(superclass, receiver, name) {
                        Ok(()) => {}
                        Err(message) => {
                            if let Some(result) = self.handle_runtime_error(message) {
                                return result;
                            }
                            continue;
                        }
                    }
                }
                OpCode::GetIndex => {
                    if let Err(message) = self.get_index() {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::SetIndex => {
                    if let Err(message) = self.set_index() {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(make_bool_value(values_equal(&a, &b)));
                }
                OpCode::Greater | OpCode::Less => {
                    if let Err(message) = self.compare(instruction) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Add => {
                    if let Err(message) = self.add() {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Subtract | OpCode::Multiply | OpCode::Divide | OpCode::Modulo => {
                    if let Err(message) = self.numeric_binary(instruction) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(make_bool_value(is_falsey(&value)));
                }
                OpCode::Negate => {
                    if !is_number(&self.peek(0)) {
                        if let Some(result) = self.handle_runtime_error("Operand must be a number.".to_string()) {
                            return result;
                        }
                        continue;
                    }
                    let value = self.pop();
                    self.push(make_number_value(-as_number(&value)));
                }
                OpCode::ToString => {
                    let value = self.pop();
                    if is_string(&value) {
                        self.push(value);
                    } else {
                        let text = format_value(&value);
                        let str_value = self.string_value(&text);
                        self.push(str_value);
                    }
                }
                OpCode::Echo => {
                    let value = self.pop();
                    println!("{}", format_value(&value));
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if is_falsey(&self.peek(0)) {
                        self.current_frame_mut().ip += offset as usize;
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = self.read_short();
                    if !is_falsey(&self.peek(0)) {
                        self.current_frame_mut().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.current_frame_mut().ip -= offset as usize;
                }
                OpCode::Call => {
                    let argument_count = self.read_byte();
                    let callee = self.peek(argument_count as usize);
                    if let Err(message) = self.call_value(callee, argument_count) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Invoke => {
                    let name = self.read_string_constant();
                    let argument_count = self.read_byte();
                    if let Err(message) = self.invoke(name, argument_count) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string_constant();
                    let argument_count = self.read_byte();
                    let superclass_value = self.pop();
                    let superclass = unsafe { as_class_object(&superclass_value) };
                    if let Err(message) = self.invoke_from_class(superclass, name, argument_count) {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Closure => self.closure(),
                OpCode::CloseUpvalue => {
                    let top_index = self.stack.len() - 1;
                    let top_ptr = &mut self.stack[top_index] as *mut Value;
                    self.close_upvalues_from(top_ptr);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("return with no active frame");
                    let base_ptr = &mut self.stack[frame.stack_base] as *mut Value;
                    self.close_upvalues_from(base_ptr);
                    self.stack.truncate(frame.stack_base);
                    if self.frames.is_empty() {
                        return InterpretResult::Ok;
                    }
                    self.push(result);
                }
                OpCode::Class => {
                    let name_value = self.read_string_constant();
                    let name = unsafe { (*as_string(&name_value)).content.clone() };
                    let class_ptr = self.heap.alloc_class(name);
                    self.push(make_class_value(class_ptr));
                }
                OpCode::Inherit => {
                    if let Err(message) = self.inherit() {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::Method => {
                    let name = self.read_string_constant();
                    self.define_method(name);
                }
                OpCode::Field => {
                    let name = self.read_string_constant();
                    self.define_field(name);
                }
                OpCode::BuildList => {
                    let count = self.read_byte() as usize;
                    let list_ptr = self.heap.alloc_list();
                    let start = self.stack.len() - count;
                    let items: Vec<Value> = self.stack.split_off(start);
                    unsafe {
                        for item in items {
                            (*list_ptr).push(item);
                        }
                    }
                    self.push(make_list_value(list_ptr));
                }
                OpCode::BuildDict => {
                    let count = self.read_byte() as usize;
                    let dict_ptr = self.heap.alloc_dict();
                    let start = self.stack.len() - count * 2;
                    let pairs: Vec<Value> = self.stack.split_off(start);
                    unsafe {
                        for pair in pairs.chunks_exact(2) {
                            (*dict_ptr).insert(pair[0], pair[1]);
                        }
                    }
                    self.push(make_dict_value(dict_ptr));
                }
                OpCode::Import => {
                    // Module/path resolution is out of scope; the statement
                    // only needs to parse and execute as a no-op.
                }
                OpCode::PushTry => {
                    let offset = self.read_short();
                    let catch_ip = self.current_frame().ip + offset as usize;
                    let stack_depth = self.stack.len();
                    self.current_frame_mut().handlers.push(ExceptionHandler { catch_ip, stack_depth });
                }
                OpCode::PopTry => {
                    self.current_frame_mut().handlers.pop();
                }
                OpCode::Raise => {
                    let exception = self.pop();
                    if !self.propagate_exception(exception) {
                        eprintln!("Uncaught exception: {}", self.describe_exception(&exception));
                        self.print_stack_trace();
                        self.frames.clear();
                        self.stack.clear();
                        return InterpretResult::RuntimeError;
                    }
                }
                OpCode::MatchClass => {
                    if let Err(message) = self.match_class() {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
                OpCode::ForeachGet => {
                    if let Err(message) = self.foreach_get() {
                        if let Some(result) = self.handle_runtime_error(message) {
                            return result;
                        }
                        continue;
                    }
                }
            }

            if self.heap.should_collect() {
                self.collect_garbage();
            }
        }
    }

    // ---- arithmetic/comparison ----

    fn compare(&mut self, op: OpCode) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        if !is_number(&a) || !is_number(&b) {
            return Err("Operands must be numbers.".to_string());
        }
        let result = match op {
            OpCode::Greater => as_number(&a) > as_number(&b),
            OpCode::Less => as_number(&a) < as_number(&b),
            _ => unreachable!(),
        };
        self.push(make_bool_value(result));
        Ok(())
    }

    fn numeric_binary(&mut self, op: OpCode) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        if !is_number(&a) || !is_number(&b) {
            return Err("Operands must be numbers.".to_string());
        }
        let (x, y) = (as_number(&a), as_number(&b));
        let result = match op {
            OpCode::Subtract => x - y,
            OpCode::Multiply => x * y,
            OpCode::Divide => x / y,
            OpCode::Modulo => x % y,
            _ => unreachable!(),
        };
        self.push(make_number_value(result));
        Ok(())
    }

    /// `+` on two numbers adds, on two strings concatenates (interning the
    /// result), and on a list and any value appends in place (spec.md §4.6
    /// "Arithmetic operators are overloaded").
    fn add(&mut self) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        if is_number(&a) && is_number(&b) {
            self.push(make_number_value(as_number(&a) + as_number(&b)));
        } else if is_string(&a) && is_string(&b) {
            let combined = unsafe { format!("{}{}", (*as_string(&a)).content, (*as_string(&b)).content) };
            let value = self.string_value(&combined);
            self.push(value);
        } else if is_list(&a) {
            let list_ptr = unsafe { as_list(&a) };
            unsafe { (*list_ptr).push(b) };
            self.push(a);
        } else {
            return Err("Operands must be two numbers, two strings, or a list and a value.".to_string());
        }
        Ok(())
    }

    // ---- properties / indexing ----

    fn get_property(&mut self, name: Value) -> Result<(), String> {
        let receiver = self.peek(0);
        if !is_instance(&receiver) {
            return Err("Only instances have properties.".to_string());
        }
        let instance = unsafe { as_instance_object(&receiver) };
        let field = unsafe { (*instance).fields.get(&name) };
        if !is_empty(&field) {
            self.pop();
            self.push(field);
            return Ok(());
        }
        let class = unsafe { (*instance).class };
        self.bind_method(class, receiver, name)?;
        Ok(())
    }

    fn set_property(&mut self, name: Value) -> Result<(), String> {
        let value = self.peek(0);
        let receiver = self.peek(1);
        if !is_instance(&receiver) {
            return Err("Only instances have fields.".to_string());
        }
        let instance = unsafe { as_instance_object(&receiver) };
        unsafe { (*instance).fields.insert(name, value) };
        self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    fn get_index(&mut self) -> Result<(), String> {
        let index = self.pop();
        let target = self.pop();
        if is_list(&target) {
            if !is_number(&index) {
                return Err("List index must be a number.".to_string());
            }
            let list = unsafe { &*as_list(&target) };
            match list.get(as_number(&index) as i64) {
                Some(value) => self.push(value),
                None => return Err("List index out of range.".to_string()),
            }
        } else if is_dict(&target) {
            let dict = unsafe { &*as_dict(&target) };
            match dict.get(&index) {
                Some(value) => self.push(value),
                None => return Err("Key not found in dict.".to_string()),
            }
        } else {
            return Err("Only lists and dicts support indexing.".to_string());
        }
        Ok(())
    }

    /// `foreach` indexing: positional for lists, but dicts have no
    /// "entry at position i" under key-hash lookup, so this visits keys in
    /// insertion order instead of routing through `get_index`.
    fn foreach_get(&mut self) -> Result<(), String> {
        let index = self.pop();
        let target = self.pop();
        if is_list(&target) {
            let list = unsafe { &*as_list(&target) };
            match list.get(as_number(&index) as i64) {
                Some(value) => self.push(value),
                None => return Err("List index out of range.".to_string()),
            }
        } else if is_dict(&target) {
            let dict = unsafe { &*as_dict(&target) };
            match dict.key_at(as_number(&index) as usize) {
                Some(key) => self.push(key),
                None => return Err("Dict index out of range.".to_string()),
            }
        } else {
            return Err("Only lists and dicts support foreach.".to_string());
        }
        Ok(())
    }

    /// Walks the raised instance's class chain looking for `class_value`,
    /// leaving the exception on the stack either way (compiler.rs's
    /// try_statement decides what to do with the bool result).
    fn match_class(&mut self) -> Result<(), String> {
        let class_value = self.pop();
        let exception = self.peek(0);
        if !is_class(&class_value) {
            return Err("Exception type must be a class.".to_string());
        }
        let target = unsafe { as_class_object(&class_value) };
        let matches = if is_instance(&exception) {
            let instance = unsafe { as_instance_object(&exception) };
            let mut current = unsafe { (*instance).class };
            let mut found = false;
            while !current.is_null() {
                if current == target {
                    found = true;
                    break;
                }
                current = unsafe { (*current).superclass };
            }
            found
        } else {
            false
        };
        self.push(make_bool_value(matches));
        Ok(())
    }

    fn set_index(&mut self) -> Result<(), String> {
        let value = self.pop();
        let index = self.pop();
        let target = self.pop();
        if is_list(&target) {
            if !is_number(&index) {
                return Err("List index must be a number.".to_string());
            }
            let list = unsafe { &mut *as_list(&target) };
            if !list.set(as_number(&index) as i64, value) {
                return Err("List index out of range.".to_string());
            }
        } else if is_dict(&target) {
            let dict = unsafe { &mut *as_dict(&target) };
            dict.insert(index, value);
        } else {
            return Err("Only lists and dicts support indexing.".to_string());
        }
        self.push(value);
        Ok(())
    }

    // ---- calls ----

    fn call_value(&mut self, callee: Value, argument_count: u8) -> Result<(), String> {
        if is_object(&callee) {
            let obj = unsafe { as_object(&callee) };
            match unsafe { (*obj).obj_type } {
                ObjectType::Closure => {
                    return self.call_closure(obj as *mut ObjectClosure, argument_count);
                }
                ObjectType::Native => {
                    let native = unsafe { (*obj).as_native() };
                    if native.arity != argument_count {
                        return Err(format!(
                            "Expected {} arguments but got {}.",
                            native.arity, argument_count
                        ));
                    }
                    let base = self.stack.len() - argument_count as usize;
                    let args: Vec<Value> = self.stack[base..].to_vec();
                    let result = native.call(self, &args)?;
                    self.stack.truncate(base - 1);
                    self.push(result);
                    return Ok(());
                }
                ObjectType::Class => {
                    let class_ptr = obj as *mut crate::objects::ObjectClass;
                    let instance_ptr = self.heap.alloc_instance(class_ptr);
                    let base = self.stack.len() - argument_count as usize - 1;
                    self.stack[base] = make_instance_value(instance_ptr);
                    let initializer = unsafe { (*class_ptr).initializer };
                    if !initializer.is_null() {
                        return self.call_closure(initializer, argument_count);
                    } else if argument_count != 0 {
                        return Err(format!("Expected 0 arguments but got {}.", argument_count));
                    }
                    return Ok(());
                }
                ObjectType::BoundMethod => {
                    let bound = unsafe { (*obj).as_bound_method() };
                    let method = bound.method;
                    let receiver = bound.receiver;
                    let base = self.stack.len() - argument_count as usize - 1;
                    self.stack[base] = receiver;
                    return self.call_closure(method, argument_count);
                }
                _ => {}
            }
        }
        Err("Can only call functions and classes.".to_string())
    }

    fn call_closure(&mut self, closure: *mut ObjectClosure, argument_count: u8) -> Result<(), String> {
        let (arity, is_variadic) = unsafe {
            let function = (*closure).function();
            (function.arity, function.is_variadic)
        };
        if is_variadic {
            let fixed = arity as usize - 1;
            if (argument_count as usize) < fixed {
                return Err(format!("Expected at least {} arguments but got {}.", fixed, argument_count));
            }
            let extra = argument_count as usize - fixed;
            let start = self.stack.len() - extra;
            let trailing: Vec<Value> = self.stack.split_off(start);
            let list_ptr = self.heap.alloc_list();
            unsafe {
                for value in trailing {
                    (*list_ptr).push(value);
                }
            }
            self.push(make_list_value(list_ptr));
        } else if argument_count != arity {
            return Err(format!("Expected {} arguments but got {}.", arity, argument_count));
        }

        if self.frames.len() >= FRAMES_MAX {
            return Err("Stack overflow.".to_string());
        }

        let stack_base = self.stack.len() - arity as usize - 1;
        self.frames.push(CallFrame::new(closure, stack_base));
        Ok(())
    }

    fn bind_method(&mut self, class: *mut crate::objects::ObjectClass, receiver: Value, name: Value) -> Result<(), String> {
        let method = unsafe { self.find_method(class, &name) };
        match method {
            Some(method) => {
                let bound_ptr = self.heap.alloc_bound_method(receiver, method);
                self.push(make_bound_method_value(bound_ptr));
                Ok(())
            }
            None => Err(format!("Undefined property '{}'.", format_value(&name))),
        }
    }

    unsafe fn find_method(&self, class: *mut crate::objects::ObjectClass, name: &Value) -> Option<*mut ObjectClosure> {
        let mut current = class;
        while !current.is_null() {
            let value = (*current).methods.get(name);
            if !is_empty(&value) {
                return Some(as_closure_object(&value));
            }
            current = (*current).superclass;
        }
        None
    }

    fn invoke(&mut self, name: Value, argument_count: u8) -> Result<(), String> {
        let receiver = self.peek(argument_count as usize);
        if !is_instance(&receiver) {
            return Err("Only instances have methods.".to_string());
        }
        let instance = unsafe { as_instance_object(&receiver) };
        let field = unsafe { (*instance).fields.get(&name) };
        if !is_empty(&field) {
            let base = self.stack.len() - argument_count as usize - 1;
            self.stack[base] = field;
            return self.call_value(field, argument_count);
        }
        let class = unsafe { (*instance).class };
        self.invoke_from_class(class, name, argument_count)
    }

    fn invoke_from_class(&mut self, class: *mut crate::objects::ObjectClass, name: Value, argument_count: u8) -> Result<(), String> {
        let method = unsafe { self.find_method(class, &name) };
        match method {
            Some(method) => self.call_closure(method, argument_count),
            None => Err(format!("Undefined property '{}'.", format_value(&name))),
        }
    }

    // ---- classes ----

    fn inherit(&mut self) -> Result<(), String> {
        let subclass_value = self.peek(0);
        let superclass_value = self.peek(1);
        if !is_class(&superclass_value) {
            return Err("Superclass must be a class.".to_string());
        }
        let superclass = unsafe { as_class_object(&superclass_value) };
        let subclass = unsafe { as_class_object(&subclass_value) };
        unsafe {
            for (k, v) in (*superclass).methods.iter() {
                (*subclass).methods.insert(*k, *v);
            }
            for (k, v) in (*superclass).field_defaults.iter() {
                (*subclass).field_defaults.insert(*k, *v);
            }
            (*subclass).initializer = (*superclass).initializer;
            (*subclass).superclass = superclass;
        }
        self.pop();
        Ok(())
    }

    fn define_method(&mut self, name: Value) {
        let method_value = self.pop();
        let class_value = self.peek(0);
        let class = unsafe { as_class_object(&class_value) };
        let method_ptr = unsafe { as_closure_object(&method_value) };
        unsafe {
            if (*as_string(&name)).content == "@new" {
                (*class).initializer = method_ptr;
            }
            (*class).methods.insert(name, method_value);
        }
    }

    fn define_field(&mut self, name: Value) {
        let value = self.pop();
        let class_value = self.peek(0);
        let class = unsafe { as_class_object(&class_value) };
        unsafe { (*class).field_defaults.insert(name, value) };
    }

    fn closure(&mut self) {
        let function_value = self.read_constant();
        let function_ptr = unsafe { as_function_object(&function_value) };
        let closure_ptr = self.heap.alloc_closure(function_ptr);
        let upvalue_count = unsafe { (*function_ptr).upvalue_count };
        for i in 0..upvalue_count {
            let is_local = self.read_byte();
            let index = self.read_byte() as usize;
            let upvalue = if is_local == 1 {
                let base = self.current_frame().stack_base;
                self.capture_upvalue(base + index)
            } else {
                let enclosing = self.current_frame().closure;
                unsafe { (*enclosing).upvalues[index] }
            };
            unsafe { (*closure_ptr).upvalues[i] = upvalue };
        }
        self.push(make_closure_value(closure_ptr));
    }

    // ---- upvalues ----

    fn capture_upvalue(&mut self, stack_index: usize) -> *mut ObjectUpvalue {
        let target_ptr: *mut Value = &mut self.stack[stack_index] as *mut Value;
        let mut previous: *mut ObjectUpvalue = std::ptr::null_mut();
        let mut current = self.open_upvalues;
        while !current.is_null() {
            let location = unsafe { (*current).location };
            if location == target_ptr {
                return current;
            }
            if location < target_ptr {
                break;
            }
            previous = current;
            current = unsafe { (*current).next_open };
        }

        let created = self.heap.alloc_upvalue(target_ptr);
        unsafe { (*created).next_open = current };
        if previous.is_null() {
            self.open_upvalues = created;
        } else {
            unsafe { (*previous).next_open = created };
        }
        created
    }

    fn close_upvalues_from(&mut self, from_ptr: *mut Value) {
        while !self.open_upvalues.is_null() {
            let location = unsafe { (*self.open_upvalues).location };
            if location < from_ptr {
                break;
            }
            let upvalue = self.open_upvalues;
            unsafe {
                (*upvalue).close();
                self.open_upvalues = (*upvalue).next_open;
            }
        }
    }

    // ---- exceptions ----

    fn propagate_exception(&mut self, exception: Value) -> bool {
        loop {
            let handler = match self.frames.last_mut() {
                Some(frame) => frame.handlers.pop(),
                None => return false,
            };
            match handler {
                Some(handler) => {
                    self.stack.truncate(handler.stack_depth);
                    self.push(exception);
                    self.current_frame_mut().ip = handler.catch_ip;
                    return true;
                }
                None => {
                    self.frames.pop();
                }
            }
        }
    }

    fn handle_runtime_error(&mut self, message: String) -> Option<InterpretResult> {
        let exception = self.make_exception(message.clone());
        if self.propagate_exception(exception) {
            None
        } else {
            eprintln!("Uncaught exception: {}", message);
            self.print_stack_trace();
            self.frames.clear();
            self.stack.clear();
            Some(InterpretResult::RuntimeError)
        }
    }

    fn make_exception(&mut self, message: String) -> Value {
        let class_name = self.string_value("Exception");
        let class_value = self.globals.get(&class_name);
        if is_class(&class_value) {
            let class_ptr = unsafe { as_class_object(&class_value) };
            let instance_ptr = self.heap.alloc_instance(class_ptr);
            let message_key = self.string_value("message");
            let message_value = self.string_value(&message);
            unsafe { (*instance_ptr).fields.insert(message_key, message_value) };
            make_instance_value(instance_ptr)
        } else {
            self.string_value(&message)
        }
    }

    fn describe_exception(&self, value: &Value) -> String {
        if is_instance(value) {
            let instance = unsafe { as_instance_object(value) };
            let message_key = {
                let hash = crate::objects::string::fnv1a_hash(b"message");
                self.heap.strings.find_interned("message", hash)
            };
            if let Some(key_ptr) = message_key {
                let field = unsafe { (*instance).fields.get(&make_string_value(key_ptr)) };
                if is_string(&field) {
                    return unsafe { (*as_string(&field)).content.clone() };
                }
            }
        }
        format_value(value)
    }

    fn print_stack_trace(&self) {
        for frame in self.frames.iter().rev() {
            let line = frame.chunk().read_line_from_offset(frame.ip.saturating_sub(1)).unwrap_or(0);
            eprintln!("[line {}] in {}", line, frame.function().display_name());
        }
    }

    // ---- garbage collection ----

    fn collect_garbage(&mut self) {
        let frame_closures: Vec<*mut Object> = self.frames.iter().map(|frame| frame.closure as *mut Object).collect();
        let roots = Roots {
            stack: &self.stack,
            globals: &self.globals,
            frame_closures: &frame_closures,
            open_upvalues: self.open_upvalues,
        };
        gc::collect(&mut self.heap, &roots, &mut self.gc_stats);
    }

    fn trace_stack(&self) {
        print!("          ");
        for value in &self.stack {
            print!("[ {} ]", format_value(value));
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> InterpretResult {
        let mut vm = Vm::new(VmConfig::default());
        vm.interpret(source)
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(run("var x = 1 + 2 * 3; assert(x == 7);"), InterpretResult::Ok);
    }

    #[test]
    fn string_concatenation_interns() {
        assert_eq!(run("var s = \"foo\" + \"bar\"; assert(s == \"foobar\");"), InterpretResult::Ok);
    }

    #[test]
    fn closures_capture_upvalues() {
        let source = r#"
            def make_counter() {
                var count = 0;
                def increment() {
                    ++count;
                    return count;
                }
                return increment;
            }
            var counter = make_counter();
            assert(counter() == 1);
            assert(counter() == 2);
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn classes_support_inheritance_and_bound_methods() {
        let source = r#"
            class Animal {
                speak() { return "..."; }
            }
            class Dog < Animal {
                speak() { return "Woof"; }
            }
            var d = Dog();
            assert(d.speak() == "Woof");
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn try_catch_recovers_from_raise() {
        let source = r#"
            var result = empty;
            try {
                raise Exception("boom");
            } catch (Exception as e) {
                result = e.message;
            }
            assert(result == "boom");
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn lists_and_dicts_round_trip() {
        let source = r#"
            var xs = [1, 2, 3];
            xs[1] = 20;
            assert(xs[1] == 20);
            var d = {"a": 1, "b": 2};
            assert(d["b"] == 2);
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn catch_only_matches_declared_exception_type() {
        let source = r#"
            class TypeError { @new(message) { this.message = message; } }
            var log = "";
            try {
                try {
                    raise Exception("boom");
                } catch (TypeError as e) {
                    log = log + "wrong;";
                }
            } catch (Exception as e) {
                log = log + "right:" + e.message;
            }
            assert(log == "right:boom");
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn try_without_catch_reraises_after_finally() {
        let source = r#"
            var log = "";
            try {
                try {
                    raise Exception("x");
                } finally {
                    log = log + "finally;";
                }
            } catch (Exception as e) {
                log = log + "caught:" + e.message;
            }
            assert(log == "finally;caught:x");
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn return_inside_try_still_runs_finally() {
        let source = r#"
            var witness = false;
            def f() {
                try {
                    return 1;
                } finally {
                    witness = true;
                }
            }
            assert(f() == 1);
            assert(witness == true);
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn return_inside_finally_supersedes_pending_return() {
        let source = r#"
            def f() {
                try {
                    return 1;
                } finally {
                    return 2;
                }
            }
            assert(f() == 2);
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }

    #[test]
    fn foreach_over_dict_visits_keys_in_insertion_order() {
        let source = r#"
            var d = {"a": 1, "b": 2, "c": 3};
            var keys = "";
            foreach (var k in d) {
                keys = keys + k;
            }
            assert(keys == "abc");
        "#;
        assert_eq!(run(source), InterpretResult::Ok);
    }
}
