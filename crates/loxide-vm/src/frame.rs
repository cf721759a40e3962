//! Per-invocation call frame. See spec.md §4.5.

use loxide_core::ObjRef;

/// `{closure, instruction_pointer, slots_base}`: `slots_base` is the stack
/// index of slot 0 for this invocation — the callee (or bound receiver) at
/// call time, arguments above it, then locals.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    pub closure: ObjRef,
    pub ip: usize,
    pub base: usize,
}
