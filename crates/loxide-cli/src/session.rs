//! Shared compile-and-run plumbing plus the REPL loop. Split out of `lib.rs`
//! so `run_file` and the REPL can't drift on error-to-exit-code mapping.

use std::io::{self, Write};

use loxide_core::disasm::disassemble_chunk;
use loxide_vm::Vm;

use crate::exit::ExitCode;

/// Compiles `source` and, on success, runs it. `repl_echo` enables the
/// compiler's bare-expression-statement echo (REPL only, never for files).
/// Both compile and runtime failures are printed here so callers only need
/// to react to the resulting exit code.
pub fn compile_and_run(
    vm: &mut Vm,
    source: &str,
    show_bytecode: bool,
    repl_echo: bool,
) -> Result<(), ExitCode> {
    let function = match loxide_compiler::compile(source, vm.heap_mut(), repl_echo) {
        Ok(function) => function,
        Err(err) => {
            eprintln!("{err}");
            return Err(ExitCode::DataError);
        }
    };

    if show_bytecode {
        if let Some(f) = vm.heap().as_function(function) {
            eprint!("{}", disassemble_chunk(&f.chunk, &f.signature.name, vm.heap()));
        }
    }

    match vm.interpret(function) {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("{err}");
            Err(ExitCode::SoftwareError)
        }
    }
}

/// Runs the interactive REPL until `quit`/`exit` or EOF. Returns `Ok` on a
/// clean exit; a failed line never aborts the session, matching a REPL's
/// usual "one bad line doesn't kill the process" behavior.
pub fn repl(vm: &mut Vm, initial_show_bytecode: bool) -> ExitCode {
    let mut show_bytecode = initial_show_bytecode;
    let stdin = io::stdin();
    let mut line = String::new();

    println!("loxide REPL. Type `quit` or `exit` to leave, `:help` is not a thing yet.");
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            println!();
            return ExitCode::Ok;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match trimmed {
            "quit" | "exit" => return ExitCode::Ok,
            ":toggle-bytecode" => {
                show_bytecode = !show_bytecode;
                println!("bytecode disassembly: {}", if show_bytecode { "on" } else { "off" });
                continue;
            }
            ":toggle-tracing" => {
                let now_on = !vm.is_tracing();
                vm.set_trace(now_on);
                println!("instruction tracing: {}", if now_on { "on" } else { "off" });
                continue;
            }
            ":gc" => {
                vm.force_gc();
                println!("collected. {} bytes live.", vm.bytes_allocated());
                continue;
            }
            ":gc-stats" => {
                println!(
                    "bytes_allocated={} next_gc_threshold={}",
                    vm.bytes_allocated(),
                    vm.next_gc_threshold()
                );
                continue;
            }
            _ => {}
        }

        if let Some(path) = trimmed.strip_prefix(":load ") {
            match std::fs::read_to_string(path.trim()) {
                Ok(source) => {
                    let _ = compile_and_run(vm, &source, show_bytecode, false);
                }
                Err(err) => eprintln!("Can't open file {}: {err}", path.trim()),
            }
            continue;
        }

        let _ = compile_and_run(vm, trimmed, show_bytecode, true);
    }
}
