//! Value/object model, bytecode container, string interning, and the
//! mark-sweep garbage collector shared by the compiler and the VM.
//!
//! This crate owns every type that both `loxide-compiler` (which only
//! *produces* bytecode) and `loxide-vm` (which only *consumes* it) need to
//! agree on: [`Value`], the heap object model in [`object`], the
//! instruction container in [`chunk`], the hash table in [`table`], and the
//! collector in [`gc`]. Nothing in here knows how to run a program; see
//! `loxide-vm` for that.

pub mod chunk;
pub mod disasm;
pub mod format;
pub mod gc;
pub mod object;
pub mod table;
pub mod value;

pub use chunk::{Chunk, ChunkError, OpCode};
pub use gc::{Heap, Roots};
pub use object::{
    BoundMethodObj, ClassKind, ClassObj, ClosureObj, FunctionObj, InstanceObj, InstancePayload,
    LString, NativeFn, NativeFunctionObj, NativeHost, ObjKind, ObjRef, Param, Signature,
    UpvalueLocation, UpvalueObj,
};
pub use table::Table;
pub use value::{format_number, Value};

/// Re-exports the types most call sites need; `use loxide_core::prelude::*;`
/// in the compiler and VM crates.
pub mod prelude {
    pub use crate::{
        Chunk, ChunkError, Heap, NativeFn, NativeHost, ObjKind, ObjRef, OpCode, Roots, Signature,
        Table, Value,
    };
}
