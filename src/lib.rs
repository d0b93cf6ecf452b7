//! Embeddable core of a dynamically-typed scripting-language runtime:
//! scanner, compiler, heap/GC, and bytecode VM (spec.md §OVERVIEW).
//!
//! Line editing, flag parsing, module/path resolution, and built-in method
//! libraries are out of scope for the library itself; `src/main.rs` is a
//! minimal host binary that runs a script file through it. The embedding
//! surface this crate exposes is just [`Vm`], [`VmConfig`], and
//! [`InterpretResult`].

pub mod call_frame;
pub mod chunk;
pub mod compiler;
pub mod constants;
pub mod debug;
pub mod gc;
pub mod heap;
pub mod natives;
pub mod objects;
pub mod scanner;
pub mod table;
pub mod value;
pub mod vm;

pub use vm::{InterpretResult, Vm, VmConfig};
