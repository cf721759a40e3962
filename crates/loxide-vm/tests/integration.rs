//! End-to-end tests: compile a source string straight into a fresh `Vm`'s
//! heap, run it, and inspect the resulting global state. Mirrors the
//! compile-link-run shape of `vitte-core`'s own integration suite, but
//! there is no link step: the compiler writes directly into the heap the
//! VM will execute against.

use loxide_core::{NativeHost, Value};
use loxide_vm::{VmError, Vm};

fn run(source: &str) -> Result<Vm, VmError> {
    let mut vm = Vm::new();
    let function = loxide_compiler::compile(source, vm.heap_mut(), false)
        .expect("source should compile for this test");
    vm.interpret(function)?;
    Ok(vm)
}

#[test]
fn arithmetic_and_globals() {
    let mut vm = run("var x = 1 + 2 * 3;").expect("script should run");
    assert_eq!(vm.get_global("x"), Some(Value::Number(7.0)));
}

#[test]
fn string_concatenation() {
    let mut vm = run(r#"var greeting = "hello" + ", " + "world";"#).expect("script should run");
    let v = vm.get_global("greeting").expect("greeting should be set");
    assert_eq!(loxide_core::format::display_value(vm.heap(), v), "hello, world");
}

#[test]
fn closures_capture_locals_by_reference() {
    let mut vm = run(
        r#"
        fun make_counter() {
            var count = 0;
            fun increment() {
                count = count + 1;
                return count;
            }
            return increment;
        }
        var counter = make_counter();
        var a = counter();
        var b = counter();
        var c = counter();
        "#,
    )
    .expect("script should run");
    assert_eq!(vm.get_global("a"), Some(Value::Number(1.0)));
    assert_eq!(vm.get_global("b"), Some(Value::Number(2.0)));
    assert_eq!(vm.get_global("c"), Some(Value::Number(3.0)));
}

#[test]
fn classes_fields_and_methods() {
    let mut vm = run(
        r#"
        class Counter {
            __init__(start) {
                this.value = start;
            }
            bump() {
                this.value = this.value + 1;
                return this.value;
            }
        }
        var c = Counter(10);
        var first = c.bump();
        var second = c.bump();
        "#,
    )
    .expect("script should run");
    assert_eq!(vm.get_global("first"), Some(Value::Number(11.0)));
    assert_eq!(vm.get_global("second"), Some(Value::Number(12.0)));
}

#[test]
fn control_flow_if_while_for() {
    let mut vm = run(
        r#"
        var total = 0;
        for (var i = 0; i < 5; i = i + 1) {
            if (i == 2) {
                total = total + 100;
            } else {
                total = total + i;
            }
        }
        "#,
    )
    .expect("script should run");
    assert_eq!(vm.get_global("total"), Some(Value::Number(108.0)));
}

fn expect_err(result: Result<Vm, VmError>) -> VmError {
    match result {
        Ok(_) => panic!("expected a runtime error but the script ran to completion"),
        Err(e) => e,
    }
}

#[test]
fn undefined_global_is_a_runtime_error_not_a_panic() {
    let err = expect_err(run("print undefined_thing;"));
    assert!(matches!(err, VmError::Lookup(_)));
}

#[test]
fn calling_a_number_is_a_type_error() {
    let err = expect_err(run("var n = 5; n();"));
    assert!(matches!(err, VmError::Type(_)));
}

#[test]
fn wrong_arity_is_an_arity_error() {
    let err = expect_err(run("fun one(a) { return a; } one(1, 2);"));
    assert!(matches!(err, VmError::Arity(_)));
}

#[test]
fn runtime_error_leaves_the_vm_stack_clean() {
    let mut vm = Vm::new();
    let function = loxide_compiler::compile("var n = 5; n();", vm.heap_mut(), false).expect("compiles");
    assert!(vm.interpret(function).is_err());
    // A fresh interpret() after a failure should not trip a leftover stack
    // overflow or frame-mismatch assertion.
    let function2 = loxide_compiler::compile("var ok = 1;", vm.heap_mut(), false).expect("compiles");
    assert!(vm.interpret(function2).is_ok());
    assert_eq!(vm.get_global("ok"), Some(Value::Number(1.0)));
}
