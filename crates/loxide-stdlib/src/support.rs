//! Shared helpers for wiring native functions onto a class's method table.
//! Grounded on clox's `lox_list.c`/`lox_string.c` `define_method` helper:
//! intern the name, allocate the native, register it, all under one nursery
//! pin so the name and the function object survive any GC triggered by the
//! interning of a *later* method's name.

use loxide_core::object::{NativeFn, NativeFunctionObj, Signature};
use loxide_core::{Heap, NativeHost, ObjKind, ObjRef, Value};

pub(crate) fn define_method(
    heap: &mut Heap,
    class_ref: ObjRef,
    name: &str,
    min_arity: u8,
    arity: u8,
    func: NativeFn,
    doc: &str,
) {
    let name_ref = heap.intern(name);
    let native_ref = heap.alloc(ObjKind::NativeFunction(NativeFunctionObj {
        signature: Signature { name: name.to_string(), arity, min_arity, params: Vec::new() },
        doc: Some(doc.to_string()),
        func,
        is_method: true,
    }));
    let hash = heap.string_hash(name_ref);
    heap.as_class_mut(class_ref).unwrap().methods.set(name_ref, hash, Value::Obj(native_ref));
}

/// Resolves a Lox-level (possibly negative) index against `len`, producing
/// the exact out-of-range message spec.md pins for list indexing. Shared by
/// `list.at`/`list.set`/`GET_INDEX` semantics and reused loosely by string
/// slicing, whose bounds are spelled out separately since it takes a range
/// rather than a single index.
pub(crate) fn resolve_index(n: i64, len: usize) -> Result<usize, String> {
    let m = len as i64;
    let resolved = if n < 0 { n + m } else { n };
    if resolved < 0 || resolved >= m {
        Err(format!("tried to access index {n}, but valid range is [0..{}] or [-{}..-1]", m - 1, m))
    } else {
        Ok(resolved as usize)
    }
}

pub(crate) fn as_integer(v: Value) -> Option<i64> {
    match v {
        Value::Number(n) if n.trunc() == n => Some(n as i64),
        _ => None,
    }
}

/// Every native in this crate funnels its type errors through here so the
/// `Value::Error` sentinel contract (spec.md §3) is honored uniformly.
pub(crate) fn fail(host: &mut dyn NativeHost, message: impl Into<String>) -> Value {
    host.fail(message.into())
}
