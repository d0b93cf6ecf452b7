//! Bytecode disassembler, gated behind `debug_print_code` (spec.md §6 ambient
//! stack). Grounded on the teacher's `src/debug.rs` column layout and
//! instruction categories, extended with this crate's extra opcodes.

use crate::chunk::{Chunk, OpCode};
use crate::value::{as_function_object, format_value};

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);
    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:08} ", offset);
    if offset > 0 && chunk.read_line_from_offset(offset) == chunk.read_line_from_offset(offset - 1) {
        print!("       | ");
    } else {
        print!("{:08} ", chunk.read_line_from_offset(offset).unwrap_or(0));
    }

    let instruction = OpCode::from_byte(chunk.read_from_offset(offset).unwrap());
    match instruction {
        OpCode::Constant
        | OpCode::DefineGlobal
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method
        | OpCode::Field => constant_instruction(&format!("{:?}", instruction), chunk, offset),

        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call
        | OpCode::BuildList
        | OpCode::BuildDict => byte_instruction(&format!("{:?}", instruction), chunk, offset),

        OpCode::Invoke | OpCode::SuperInvoke => {
            invoke_instruction(&format!("{:?}", instruction), chunk, offset)
        }

        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue | OpCode::PushTry => {
            jump_instruction(&format!("{:?}", instruction), 1, chunk, offset)
        }
        OpCode::Loop => jump_instruction("Loop", -1, chunk, offset),

        OpCode::Closure => closure_instruction(chunk, offset),

        _ => simple_instruction(&format!("{:?}", instruction), offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read_from_offset(offset + 1).unwrap();
    print!("{:<16} {:>4} '", name, constant);
    print!("{}", format_value(&chunk.get_constant(constant as usize)));
    println!("'");
    offset + 2
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.read_from_offset(offset + 1).unwrap();
    println!("{:<16} {:>4}", name, slot);
    offset + 2
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read_from_offset(offset + 1).unwrap();
    let argument_count = chunk.read_from_offset(offset + 2).unwrap();
    print!("{:<16} ({} args) {:>4} '", name, argument_count, constant);
    print!("{}", format_value(&chunk.get_constant(constant as usize)));
    println!("'");
    offset + 3
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.read_from_offset(offset + 1).unwrap() as u16;
    let lo = chunk.read_from_offset(offset + 2).unwrap() as u16;
    let jump = (hi << 8) | lo;
    let target = (offset as isize + 3 + sign as isize * jump as isize) as usize;
    println!("{:<16} {:>4} -> {}", name, offset, target);
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.read_from_offset(offset + 1).unwrap();
    print!("{:<16} {:>4} '", "Closure", constant);
    print!("{}", format_value(&chunk.get_constant(constant as usize)));
    println!("'");

    let function_ptr = unsafe { as_function_object(&chunk.get_constant(constant as usize)) };
    let upvalue_count = unsafe { (*function_ptr).upvalue_count };
    let mut cursor = offset + 2;
    for _ in 0..upvalue_count {
        let is_local = chunk.read_from_offset(cursor).unwrap();
        let index = chunk.read_from_offset(cursor + 1).unwrap();
        println!(
            "{:04}      |                     {} {}",
            cursor,
            if is_local == 1 { "local" } else { "upvalue" },
            index
        );
        cursor += 2;
    }
    cursor
}
