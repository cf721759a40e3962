//! The bytecode interpreter: call-frame stack, dispatch loop, and the
//! calling/property/index conventions that tie a compiled `Function` to a
//! running program. See spec.md §4.5 and §5.

pub mod error;
pub mod frame;
pub mod vm;

pub use error::{VmError, VmResult};
pub use frame::CallFrame;
pub use vm::Vm;
