//! Free native functions registered directly as globals: `clock`, `print`,
//! `println`, `help`. Grounded on `original_source/clox/src/lox_stdlib.c`
//! (`clock_native`, `print`, `println`), with `help` added per SPEC_FULL §4.

use loxide_core::object::{NativeFunctionObj, Signature};
use loxide_core::{NativeHost, ObjKind, ObjRef, Value};
use loxide_vm::Vm;

pub fn install(vm: &mut Vm) {
    define_global(vm, "clock", 0, 0, clock, "Seconds elapsed since the interpreter started.");
    define_global(vm, "print", 1, 1, print, "Writes a value's display form to stdout, without a trailing newline.");
    define_global(vm, "println", 1, 1, println_fn, "Writes a value's display form to stdout, with a trailing newline.");
    define_global(vm, "help", 1, 1, help, "Prints a callable's signature and docstring, or a class's method table.");
}

fn define_global(
    vm: &mut Vm,
    name: &str,
    min_arity: u8,
    arity: u8,
    func: loxide_core::object::NativeFn,
    doc: &str,
) {
    vm.open_nursery();
    let native_ref = vm.heap_mut().alloc(ObjKind::NativeFunction(NativeFunctionObj {
        signature: Signature { name: name.to_string(), arity, min_arity, params: Vec::new() },
        doc: Some(doc.to_string()),
        func,
        is_method: false,
    }));
    vm.close_nursery();
    vm.define_global(name, Value::Obj(native_ref));
}

fn clock(host: &mut dyn NativeHost, _args: &[Value]) -> Value {
    Value::Number(host.uptime_seconds())
}

fn print(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    use std::io::Write;
    if !matches!(args[0], Value::Nil) {
        print!("{}", loxide_core::format::display_value(host.heap(), args[0]));
        let _ = std::io::stdout().flush();
    }
    Value::Nil
}

fn println_fn(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    if !matches!(args[0], Value::Nil) {
        println!("{}", loxide_core::format::display_value(host.heap(), args[0]));
    }
    Value::Nil
}

fn help(host: &mut dyn NativeHost, args: &[Value]) -> Value {
    match args[0] {
        Value::Obj(r) => help_for_object(host, r),
        other => println!("{}: no further help available.", loxide_core::format::display_value(host.heap(), other)),
    }
    Value::Nil
}

fn help_for_object(host: &mut dyn NativeHost, r: ObjRef) {
    let heap = host.heap();
    match heap.kind(r) {
        ObjKind::Function(f) => print_callable_help(&f.signature, f.doc.as_deref()),
        ObjKind::NativeFunction(f) => print_callable_help(&f.signature, f.doc.as_deref()),
        ObjKind::Closure(c) => {
            let Some(f) = heap.as_function(c.function) else { return };
            print_callable_help(&f.signature, f.doc.as_deref());
        }
        ObjKind::Class(c) => print_method_table(heap, c.name, &c.methods),
        ObjKind::Instance(inst) => {
            let Some(class) = heap.as_class(inst.class) else { return };
            print_method_table(heap, class.name, &class.methods);
        }
        ObjKind::String(_) => println!("a string value; see the `str` class for its methods."),
        ObjKind::BoundMethod(_) | ObjKind::Upvalue(_) => println!("no further help available."),
    }
}

fn print_callable_help(signature: &Signature, doc: Option<&str>) {
    let params = signature.params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
    println!("{}({})", signature.name, params);
    if let Some(doc) = doc {
        println!("  {doc}");
    }
}

fn print_method_table(heap: &loxide_core::Heap, name: ObjRef, methods: &loxide_core::Table) {
    let class_name = heap.string_bytes(name).unwrap_or("?");
    println!("class {class_name}:");
    for (method_name, _) in methods.iter() {
        println!("  {}", heap.string_bytes(method_name).unwrap_or("?"));
    }
}
