//! loxide-cli/src/main.rs — entry point for the `loxide` binary.
//!
//! Kept minimal so `lib.rs` stays unit-testable (`cargo test -p loxide-cli`):
//! this just wires up logging and translates the library's exit reason into
//! a process exit code.

fn main() {
    env_logger::init();
    let code = loxide_cli::run();
    std::process::exit(code.into());
}
