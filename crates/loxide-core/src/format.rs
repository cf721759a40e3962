//! Heap-aware value rendering. `Value` cannot implement `Display` on its own
//! (an `Obj` handle needs the heap to resolve its referent), so `print`,
//! `println`, string concatenation, and disassembly all go through the free
//! functions here instead (spec.md §8, printed representation).

use crate::gc::Heap;
use crate::object::{ClassKind, InstanceObj, ObjKind, ObjRef};
use crate::value::{format_number, Value};
use std::fmt::Write as _;

/// The representation used by `print`, `println`, and `+` concatenation.
pub fn display_value(heap: &Heap, value: Value) -> String {
    let mut out = String::new();
    write_display_value(&mut out, value, heap);
    out
}

/// The representation used by disassembly and the REPL's bare-expression
/// echo: like `display_value`, but strings are shown quoted.
pub fn debug_repr(heap: &Heap, value: Value) -> String {
    let mut out = String::new();
    write_debug_value(&mut out, value, heap);
    out
}

pub fn write_display_value(out: &mut String, value: Value, heap: &Heap) {
    match value {
        Value::Nil => {
            let _ = write!(out, "nil");
        }
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => {
            let _ = write!(out, "{}", format_number(n));
        }
        Value::Error => {
            let _ = write!(out, "<error>");
        }
        Value::Obj(r) => write_obj_display(out, r, heap),
    }
}

pub fn write_debug_value(out: &mut String, value: Value, heap: &Heap) {
    if let Value::Obj(r) = value {
        if let ObjKind::String(s) = heap.kind(r) {
            let _ = write!(out, "\"{}\"", s.bytes);
            return;
        }
    }
    write_display_value(out, value, heap);
}

fn write_obj_display(out: &mut String, r: ObjRef, heap: &Heap) {
    match heap.kind(r) {
        ObjKind::String(s) => {
            let _ = write!(out, "{}", s.bytes);
        }
        ObjKind::Function(f) => {
            let _ = write!(out, "<fn {}>", f.signature.name);
        }
        ObjKind::NativeFunction(f) => {
            let _ = write!(out, "<native fn {}>", f.signature.name);
        }
        ObjKind::Closure(c) => {
            let name = heap.as_function(c.function).map(|f| f.signature.name.as_str()).unwrap_or("?");
            let _ = write!(out, "<fn {name}>");
        }
        ObjKind::Upvalue(_) => {
            let _ = write!(out, "<upvalue>");
        }
        ObjKind::Class(c) => {
            let name = heap.string_bytes(c.name).unwrap_or("?");
            let _ = write!(out, "<class {name}>");
        }
        ObjKind::Instance(inst) => write_instance_display(out, inst, heap),
        ObjKind::BoundMethod(b) => write_display_value(out, b.method, heap),
    }
}

fn write_instance_display(out: &mut String, inst: &InstanceObj, heap: &Heap) {
    let class = heap.as_class(inst.class);
    if matches!(class.map(|c| c.kind), Some(ClassKind::List)) {
        let _ = write!(out, "[");
        if let Some(items) = inst.as_list() {
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    let _ = write!(out, ", ");
                }
                write_display_value(out, *v, heap);
            }
        }
        let _ = write!(out, "]");
        return;
    }
    let name = class.and_then(|c| heap.string_bytes(c.name)).unwrap_or("?");
    let _ = write!(out, "<{name} instance>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ClassObj, InstancePayload};
    use crate::table::Table;

    #[test]
    fn numbers_and_nil_render_plainly() {
        let heap = Heap::new();
        assert_eq!(display_value(&heap, Value::Nil), "nil");
        assert_eq!(display_value(&heap, Value::Number(3.0)), "3");
        assert_eq!(display_value(&heap, Value::Number(3.5)), "3.5");
    }

    #[test]
    fn strings_are_quoted_only_in_debug_repr() {
        let mut heap = Heap::new();
        let s = heap.intern("hi");
        let v = Value::Obj(s);
        assert_eq!(display_value(&heap, v), "hi");
        assert_eq!(debug_repr(&heap, v), "\"hi\"");
    }

    #[test]
    fn lists_render_with_brackets() {
        let mut heap = Heap::new();
        let name = heap.intern("List");
        let class_ref = heap.alloc(ObjKind::Class(ClassObj {
            name,
            methods: Table::new(),
            kind: ClassKind::List,
        }));
        let list_ref = heap.alloc(ObjKind::Instance(InstanceObj {
            class: class_ref,
            fields: Table::new(),
            payload: InstancePayload::List(vec![Value::Number(1.0), Value::Number(2.0)]),
        }));
        assert_eq!(display_value(&heap, Value::Obj(list_ref)), "[1, 2]");
    }
}
