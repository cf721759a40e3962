//! Native globals (`clock`, `print`, `println`, `help`) and native classes
//! (`list`, `str`) installed into a freshly constructed `loxide_vm::Vm`.
//! See SPEC_FULL.md §2: unlike the teacher's `vitte-stdlib`, which only
//! needed `vitte-core`+`vitte-compiler` to compile embedded `.vit` source,
//! this crate calls straight into the VM's allocator and nursery, so it
//! depends on `loxide-vm` too.

mod globals;
mod list_class;
mod string_class;
mod support;

use loxide_core::Value;
use loxide_vm::Vm;

/// Wires every native built-in into `vm`: the four free functions, the
/// `list` class (registered as the global `list`, callable as a
/// constructor), and the `str` class (registered only as the VM's
/// string-method table, never as a named global — spec.md §4.5 notes
/// strings are never constructed via `CALL`).
pub fn install(vm: &mut Vm) {
    globals::install(vm);
    let list_class = list_class::build(vm);
    vm.define_global("list", Value::Obj(list_class));
    let str_class = string_class::build(vm);
    vm.set_string_class(str_class);
}

#[cfg(test)]
mod tests {
    use super::*;
    use loxide_core::NativeHost;

    #[test]
    fn install_registers_globals_and_classes() {
        let mut vm = Vm::new();
        install(&mut vm);
        assert!(vm.get_global("clock").is_some());
        assert!(vm.get_global("print").is_some());
        assert!(vm.get_global("println").is_some());
        assert!(vm.get_global("help").is_some());
        assert!(vm.get_global("list").is_some());
        assert!(vm.get_global("str").is_none());
    }

    #[test]
    fn list_round_trips_through_the_language() {
        let mut vm = Vm::new();
        install(&mut vm);
        let function = loxide_compiler::compile(
            r#"
            var xs = list();
            xs.append(10);
            xs.append(20);
            xs.append(30);
            var first = xs.at(0);
            var last = xs.at(-1);
            var n = xs.length();
            "#,
            vm.heap_mut(),
            false,
        )
        .expect("compiles");
        vm.interpret(function).expect("runs");
        assert_eq!(vm.get_global("first"), Some(Value::Number(10.0)));
        assert_eq!(vm.get_global("last"), Some(Value::Number(30.0)));
        assert_eq!(vm.get_global("n"), Some(Value::Number(3.0)));
    }

    #[test]
    fn string_methods_dispatch_through_string_class() {
        let mut vm = Vm::new();
        install(&mut vm);
        let function = loxide_compiler::compile(
            r#"
            var s = "hello world";
            var starts = s.starts_with("hello");
            var idx = s.index_of("world");
            var piece = s.slice(0, 5);
            "#,
            vm.heap_mut(),
            false,
        )
        .expect("compiles");
        vm.interpret(function).expect("runs");
        assert_eq!(vm.get_global("starts"), Some(Value::Bool(true)));
        assert_eq!(vm.get_global("idx"), Some(Value::Number(6.0)));
        let piece = vm.get_global("piece").expect("piece should be set");
        assert_eq!(loxide_core::format::display_value(vm.heap(), piece), "hello");
    }

    #[test]
    fn indexing_an_empty_list_reports_an_unclamped_range() {
        use loxide_vm::VmError;

        let mut vm = Vm::new();
        install(&mut vm);
        let function =
            loxide_compiler::compile("var xs = list(); xs.at(0);", vm.heap_mut(), false).expect("compiles");
        match vm.interpret(function) {
            Err(VmError::Native(message)) => {
                assert_eq!(message, "tried to access index 0, but valid range is [0..-1] or [-0..-1]");
            }
            other => panic!("expected a native index error, got {other:?}"),
        }
    }
}
