//! Minimal CLI collaborator for the `corvid` library: reads a script path
//! from the command line and runs it (spec.md §6 "added"). Line editing,
//! flag parsing, and a REPL loop are out of scope (spec.md §1).

use std::process::ExitCode;

use corvid::{InterpretResult, Vm, VmConfig};

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "corvid".to_string());
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: {} <script>", program);
            return ExitCode::from(64);
        }
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Can't open file '{}': {}", path, error);
            return ExitCode::from(74);
        }
    };

    let mut vm = Vm::new(VmConfig::default());
    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::from(0),
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}
