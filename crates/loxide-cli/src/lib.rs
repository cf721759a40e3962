//! `loxide-cli`: the REPL, file runner, and disassembler front-end built on
//! top of `loxide-compiler`, `loxide-vm`, and `loxide-stdlib`. Grounded on
//! `vitte-cli`'s "thin main, fat lib, small dispatch functions" shape.

pub mod cli;
pub mod config;
pub mod exit;
pub mod session;

use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use loxide_vm::Vm;

use exit::ExitCode;

/// Parses arguments, merges them with `.loxrc`, and dispatches to either
/// file execution or the REPL. This is the single entry point `main.rs`
/// calls; kept separate from `main` so it's callable from tests without a
/// process boundary.
pub fn run() -> ExitCode {
    let args = cli::Cli::parse();
    if args.paths.len() > 1 {
        eprintln!("Usage: loxide [script]");
        return ExitCode::Usage;
    }

    let cwd = env::current_dir().unwrap_or_else(|_| ".".into());
    let config = config::Config::load_from(&cwd);
    let trace = args.trace || config.trace;
    let show_bytecode = args.show_bytecode || config.show_bytecode;

    let mut vm = Vm::new();
    vm.set_trace(trace);
    loxide_stdlib::install(&mut vm);

    match args.paths.first() {
        Some(path) => run_file(&mut vm, path, show_bytecode),
        None => session::repl(&mut vm, show_bytecode),
    }
}

/// Reads the script, aggregating the I/O failure behind `anyhow` the way
/// `vitte-compiler`'s `compile_str` wraps its own diagnostics (§3 Ambient
/// Stack), then delegates compile/runtime failures to `compile_and_run`.
fn run_file(vm: &mut Vm, path: &Path, show_bytecode: bool) -> ExitCode {
    let source = match read_script(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::IoError;
        }
    };

    match session::compile_and_run(vm, &source, show_bytecode, false) {
        Ok(()) => ExitCode::Ok,
        Err(code) => code,
    }
}

fn read_script(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("can't open file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_file_reports_io_error_for_a_missing_path() {
        let mut vm = Vm::new();
        loxide_stdlib::install(&mut vm);
        let code = run_file(&mut vm, Path::new("/nonexistent/does-not-exist.lox"), false);
        assert_eq!(code, ExitCode::IoError);
    }

    #[test]
    fn run_file_reports_data_error_for_bad_syntax() {
        let dir = std::env::temp_dir().join("loxide_cli_test_bad_syntax");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.lox");
        fs::write(&path, "var = ;").unwrap();

        let mut vm = Vm::new();
        loxide_stdlib::install(&mut vm);
        let code = run_file(&mut vm, &path, false);
        assert_eq!(code, ExitCode::DataError);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn run_file_reports_software_error_for_a_runtime_failure() {
        let dir = std::env::temp_dir().join("loxide_cli_test_runtime_error");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime.lox");
        fs::write(&path, "print undefined_name;").unwrap();

        let mut vm = Vm::new();
        loxide_stdlib::install(&mut vm);
        let code = run_file(&mut vm, &path, false);
        assert_eq!(code, ExitCode::SoftwareError);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn run_file_succeeds_on_good_input() {
        let dir = std::env::temp_dir().join("loxide_cli_test_good");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("good.lox");
        fs::write(&path, "print 1 + 2;").unwrap();

        let mut vm = Vm::new();
        loxide_stdlib::install(&mut vm);
        let code = run_file(&mut vm, &path, false);
        assert_eq!(code, ExitCode::Ok);
        let _ = fs::remove_file(&path);
    }
}
