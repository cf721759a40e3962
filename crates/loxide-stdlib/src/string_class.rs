//! The native `str` class: never directly constructible (strings come from
//! literals and `+` concatenation, spec.md §4.5), registered only so
//! `GET_PROPERTY` on a `String` receiver has a method table to bind
//! against. Grounded on `original_source/clox/src/lox_string.c`.

use loxide_core::object::{ClassKind, ClassObj};
use loxide_core::{NativeHost, ObjKind, ObjRef, Table, Value};

use crate::support::{as_integer, define_method, fail};

pub fn build(host: &mut dyn NativeHost) -> ObjRef {
    host.open_nursery();
    let name = host.heap_mut().intern("str");
    let class_ref =
        host.heap_mut().alloc(ObjKind::Class(ClassObj { name, methods: Table::new(), kind: ClassKind::Str }));

    define_method(host.heap_mut(), class_ref, "length", 0, 0, length, "Returns the number of characters in the string.");
    define_method(
        host.heap_mut(),
        class_ref,
        "starts_with",
        1,
        1,
        starts_with,
        "Returns true if the string starts with the given prefix.",
    );
    define_method(
        host.heap_mut(),
        class_ref,
        "ends_with",
        1,
        1,
        ends_with,
        "Returns true if the string ends with the given suffix.",
    );
    define_method(
        host.heap_mut(),
        class_ref,
        "index_of",
        1,
        1,
        index_of,
        "Returns the index of the first occurrence of the target, or -1 if absent.",
    );
    define_method(
        host.heap_mut(),
        class_ref,
        "slice",
        2,
        2,
        slice,
        "Returns the substring [start, end).",
    );

    host.close_nursery();
    class_ref
}

fn self_bytes<'a>(host: &'a dyn NativeHost, args: &[Value]) -> &'a str {
    match args[0] {
        Value::Obj(r) => host.heap().string_bytes(r).expect("str methods are only ever bound to a string"),
        _ => unreachable!("str methods are only ever bound to a string"),
    }
}

fn arg_str<'a>(host: &'a dyn NativeHost, args: &[Value], idx: usize) -> Option<&'a str> {
    match args[idx] {
        Value::Obj(r) => host.heap().string_bytes(r),
        _ => None,
    }
}

fn length(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    Value::Number(self_bytes(host, args).chars().count() as f64)
}

fn starts_with(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let Some(prefix) = arg_str(host, args, 1) else {
        return fail(host, "Argument must be a string.");
    };
    let this = self_bytes(host, args);
    Value::Bool(this.starts_with(prefix))
}

fn ends_with(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let Some(suffix) = arg_str(host, args, 1) else {
        return fail(host, "Argument must be a string.");
    };
    let this = self_bytes(host, args);
    Value::Bool(this.ends_with(suffix))
}

fn index_of(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let Some(target) = arg_str(host, args, 1) else {
        return fail(host, "Argument must be a string.");
    };
    let this = self_bytes(host, args);
    if target.is_empty() {
        return Value::Number(0.0);
    }
    match this.find(target) {
        Some(byte_idx) => Value::Number(this[..byte_idx].chars().count() as f64),
        None => Value::Number(-1.0),
    }
}

fn slice(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let Some(start) = as_integer(args[1]) else {
        return fail(host, "Index must be an integer.");
    };
    let Some(end) = as_integer(args[2]) else {
        return fail(host, "Index must be an integer.");
    };
    let len = self_bytes(host, args).chars().count() as i64;
    if start < 0 || start > len || end < 0 || end > len || start > end {
        return fail(
            host,
            format!("tried to access index {start}, but valid range is [0..{}] or [-{}..-1]", len - 1, len),
        );
    }
    let substring: String = self_bytes(host, args).chars().skip(start as usize).take((end - start) as usize).collect();
    host.open_nursery();
    let r = host.heap_mut().intern(&substring);
    host.close_nursery();
    Value::Obj(r)
}
