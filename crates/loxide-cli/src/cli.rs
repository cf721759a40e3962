//! Command-line flag parsing, grounded on `vitte-cli`'s clap-derive `Cli`
//! struct — but a single positional list rather than a `Subcommand`, since
//! spec.md §6 wants a plain "file or nothing" invocation, not a verb.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "loxide", version, about = "A Lox-family bytecode interpreter")]
pub struct Cli {
    /// Script to execute. Omitted: start the REPL. More than one: a usage error.
    pub paths: Vec<PathBuf>,

    /// Print each instruction before it executes.
    #[arg(long)]
    pub trace: bool,

    /// Print disassembled bytecode after every compile.
    #[arg(long = "toggle-bytecode")]
    pub show_bytecode: bool,
}
