//! The native `list` class: a `ClassKind::List` class whose `CALL`-as-
//! constructor produces an `Instance` with an `InstancePayload::List`.
//! Methods grounded on `original_source/clox/src/lox_list.c`.

use loxide_core::object::{ClassKind, ClassObj};
use loxide_core::{NativeHost, ObjKind, ObjRef, Table, Value};

use crate::support::{as_integer, define_method, fail, resolve_index};

pub fn build(host: &mut dyn NativeHost) -> ObjRef {
    host.open_nursery();
    let name = host.heap_mut().intern("list");
    let class_ref =
        host.heap_mut().alloc(ObjKind::Class(ClassObj { name, methods: Table::new(), kind: ClassKind::List }));

    define_method(host.heap_mut(), class_ref, "length", 0, 0, length, "Returns the number of elements in the list.");
    define_method(host.heap_mut(), class_ref, "append", 1, 1, append, "Appends a value to the end of the list.");
    define_method(
        host.heap_mut(),
        class_ref,
        "at",
        1,
        1,
        at,
        "Returns the element at index (negative indexes count from the end).",
    );
    define_method(host.heap_mut(), class_ref, "set", 2, 2, set, "Sets the element at index, returning the new value.");
    define_method(
        host.heap_mut(),
        class_ref,
        "slice",
        1,
        2,
        slice,
        "Returns a new list containing elements [start, end). `end` defaults to the list's length.",
    );
    define_method(host.heap_mut(), class_ref, "clear", 0, 0, clear, "Removes all elements from the list.");
    define_method(host.heap_mut(), class_ref, "pop", 0, 0, pop, "Removes and returns the last element.");

    host.close_nursery();
    class_ref
}

fn receiver_ref(args: &[Value]) -> ObjRef {
    match args[0] {
        Value::Obj(r) => r,
        _ => unreachable!("list methods are only ever bound to a list instance"),
    }
}

fn length(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    let len = host.heap().as_instance(r).and_then(|i| i.as_list()).map_or(0, Vec::len);
    Value::Number(len as f64)
}

fn append(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    if let Some(list) = host.heap_mut().as_instance_mut(r).and_then(|i| i.as_list_mut()) {
        list.push(args[1]);
    }
    Value::Nil
}

fn at(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    let len = host.heap().as_instance(r).and_then(|i| i.as_list()).map_or(0, Vec::len);
    let Some(n) = as_integer(args[1]) else {
        return fail(host, "Index must be an integer.");
    };
    match resolve_index(n, len) {
        Ok(idx) => host.heap().as_instance(r).and_then(|i| i.as_list()).unwrap()[idx],
        Err(message) => fail(host, message),
    }
}

fn set(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    let len = host.heap().as_instance(r).and_then(|i| i.as_list()).map_or(0, Vec::len);
    let Some(n) = as_integer(args[1]) else {
        return fail(host, "Index must be an integer.");
    };
    match resolve_index(n, len) {
        Ok(idx) => {
            host.heap_mut().as_instance_mut(r).and_then(|i| i.as_list_mut()).unwrap()[idx] = args[2];
            args[2]
        }
        Err(message) => fail(host, message),
    }
}

fn slice(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    let len = host.heap().as_instance(r).and_then(|i| i.as_list()).map_or(0, Vec::len);
    let Some(start) = as_integer(args[1]) else {
        return fail(host, "Index must be an integer.");
    };
    let end = if args.len() > 2 {
        match as_integer(args[2]) {
            Some(e) => e,
            None => return fail(host, "Index must be an integer."),
        }
    } else {
        len as i64
    };
    if start < 0 || start > len as i64 || end < start || end > len as i64 {
        return fail(
            host,
            format!("tried to access index {start}, but valid range is [0..{}] or [-{}..-1]", len as i64 - 1, len),
        );
    }
    let items = host.heap().as_instance(r).and_then(|i| i.as_list()).unwrap()[start as usize..end as usize].to_vec();
    let class_ref = host.heap().as_instance(r).unwrap().class;
    host.open_nursery();
    let new_list = host.heap_mut().alloc(ObjKind::Instance(loxide_core::InstanceObj {
        class: class_ref,
        fields: Table::new(),
        payload: loxide_core::InstancePayload::List(items),
    }));
    host.close_nursery();
    Value::Obj(new_list)
}

fn clear(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    if let Some(list) = host.heap_mut().as_instance_mut(r).and_then(|i| i.as_list_mut()) {
        list.clear();
    }
    Value::Nil
}

fn pop(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    let r = receiver_ref(args);
    match host.heap_mut().as_instance_mut(r).and_then(|i| i.as_list_mut()).and_then(Vec::pop) {
        Some(v) => v,
        None => {
            eprintln!("Error: Cannot remove elements from an empty list.");
            Value::Nil
        }
    }
}
