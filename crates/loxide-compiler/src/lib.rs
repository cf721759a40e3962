//! Scanner and single-pass Pratt compiler: turns loxide source text
//! directly into bytecode owned by a `loxide_core::Heap`, with no
//! intermediate AST. See spec.md §4.2–§4.3.

pub mod compiler;
pub mod scanner;

pub use compiler::{compile, CompileError};
pub use scanner::{Scanner, Token, TokenKind};
