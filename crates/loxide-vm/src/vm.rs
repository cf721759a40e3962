//! The dispatch loop: reads one instruction at a time from the current call
//! frame's chunk and executes it against the value stack. See spec.md §4.5.

use std::time::Instant;

use loxide_core::object::{
    BoundMethodObj, ClassKind, ClassObj, ClosureObj, InstanceObj, InstancePayload, NativeHost,
};
use loxide_core::{Heap, ObjKind, ObjRef, OpCode, Roots, Table, Value};

use crate::error::{VmError, VmResult};
use crate::frame::CallFrame;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

/// The virtual machine: value stack, call-frame stack, globals, and the
/// heap they all index into. Native classes (`list`, `str`) are registered
/// from outside (`loxide-stdlib`) via [`Vm::set_string_class`] and the
/// plain [`NativeHost`] surface, since this crate has no opinion on what
/// native types exist.
pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    init_string: ObjRef,
    init_hash: u32,
    string_class: Option<ObjRef>,
    pending_native_error: Option<String>,
    trace: bool,
    start: Instant,
}

impl Vm {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("__init__");
        let init_hash = heap.string_hash(init_string);
        Vm {
            heap,
            stack: Vec::with_capacity(1024),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            init_string,
            init_hash,
            string_class: None,
            pending_native_error: None,
            trace: false,
            start: Instant::now(),
        }
    }

    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    pub fn is_tracing(&self) -> bool {
        self.trace
    }

    pub fn set_stress_gc(&mut self, on: bool) {
        self.heap.set_stress_gc(on);
    }

    pub fn bytes_allocated(&self) -> usize {
        self.heap.bytes_allocated()
    }

    pub fn next_gc_threshold(&self) -> usize {
        self.heap.next_gc_threshold()
    }

    pub fn force_gc(&mut self) {
        self.run_gc();
    }

    /// Registers the class whose methods back property access on `String`
    /// values (spec.md §4.5, "string_class" register).
    pub fn set_string_class(&mut self, class_ref: ObjRef) {
        self.string_class = Some(class_ref);
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        let name_ref = self.heap.intern(name);
        let hash = self.heap.string_hash(name_ref);
        self.globals.set(name_ref, hash, value);
    }

    /// Reads back a global by name; mainly useful to embedders and tests
    /// that want to inspect program state without routing through `print`.
    pub fn get_global(&mut self, name: &str) -> Option<Value> {
        let name_ref = self.heap.intern(name);
        let hash = self.heap.string_hash(name_ref);
        self.globals.get(name_ref, hash)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Resets value stack and call-frame stack to empty, as required after
    /// a runtime error aborts `interpret` (spec.md §7).
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    /// Wraps `function` (the compiler's top-level output, or any function
    /// constant) in a zero-upvalue closure and runs it to completion.
    pub fn interpret(&mut self, function: ObjRef) -> VmResult<()> {
        self.heap.open_nursery();
        let closure = self.heap.alloc(ObjKind::Closure(ClosureObj { function, upvalues: Vec::new() }));
        self.heap.close_nursery();
        self.stack.push(Value::Obj(closure));
        if let Err(e) = self.call_closure(closure, 0, 0) {
            self.reset();
            return Err(e);
        }
        let result = self.run();
        if result.is_err() {
            self.reset();
        }
        result
    }

    // ---- bytecode reading -------------------------------------------------

    fn top_frame_index(&self) -> usize {
        self.frames.len() - 1
    }

    fn read_byte(&mut self) -> u8 {
        let fi = self.top_frame_index();
        let closure = self.frames[fi].closure;
        let function = self.heap.as_closure(closure).unwrap().function;
        let ip = self.frames[fi].ip;
        let byte = self.heap.as_function(function).unwrap().chunk.code[ip];
        self.frames[fi].ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self, idx: u8) -> Value {
        let fi = self.top_frame_index();
        let closure = self.frames[fi].closure;
        let function = self.heap.as_closure(closure).unwrap().function;
        self.heap.as_function(function).unwrap().chunk.constants[idx as usize]
    }

    fn read_string_constant(&mut self) -> ObjRef {
        let idx = self.read_byte();
        self.read_constant(idx).as_obj().expect("name constant must be an interned string")
    }

    // ---- GC integration -----------------------------------------------

    fn run_gc(&mut self) {
        let frame_closures: Vec<ObjRef> = self.frames.iter().map(|f| f.closure).collect();
        let mut extra = vec![self.init_string];
        extra.extend(self.string_class);
        log::debug!("running GC cycle, {} bytes allocated", self.heap.bytes_allocated());
        let roots =
            Roots { stack: &self.stack, frame_closures: &frame_closures, globals: &self.globals, extra: &extra };
        self.heap.collect_garbage(roots);
    }

    fn collect_if_needed(&mut self) {
        if self.heap.should_collect() {
            self.run_gc();
        }
    }

    // ---- calling convention ---------------------------------------------

    fn call_value(&mut self, callee_slot: usize, arg_count: u8) -> VmResult<()> {
        let callee = self.stack[callee_slot];
        let Value::Obj(r) = callee else {
            return Err(VmError::Type("Can only call functions and classes.".to_string()));
        };
        if self.heap.as_closure(r).is_some() {
            self.call_closure(r, callee_slot, arg_count)
        } else if self.heap.as_native(r).is_some() {
            self.call_native(r, callee_slot, arg_count)
        } else if self.heap.as_class(r).is_some() {
            self.call_class(r, callee_slot, arg_count)
        } else if self.heap.as_bound_method(r).is_some() {
            self.call_bound_method(r, callee_slot, arg_count)
        } else {
            Err(VmError::Type("Can only call functions and classes.".to_string()))
        }
    }

    fn call_closure(&mut self, closure_ref: ObjRef, callee_slot: usize, arg_count: u8) -> VmResult<()> {
        let function_ref = self.heap.as_closure(closure_ref).unwrap().function;
        let (min_arity, arity, name) = {
            let f = self.heap.as_function(function_ref).unwrap();
            (f.signature.min_arity, f.signature.arity, f.signature.name.clone())
        };
        if arg_count < min_arity || arg_count > arity {
            return Err(VmError::Arity(arity_message(&name, min_arity, arity, arg_count)));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(VmError::StackOverflow);
        }
        self.frames.push(CallFrame { closure: closure_ref, ip: 0, base: callee_slot });
        Ok(())
    }

    fn call_native(&mut self, native_ref: ObjRef, callee_slot: usize, arg_count: u8) -> VmResult<()> {
        let (name, min_arity, arity, is_method, func) = {
            let n = self.heap.as_native(native_ref).unwrap();
            (n.signature.name.clone(), n.signature.min_arity, n.signature.arity, n.is_method, n.func)
        };
        if arg_count < min_arity || arg_count > arity {
            return Err(VmError::Arity(arity_message(&name, min_arity, arity, arg_count)));
        }
        let args_start = if is_method { callee_slot } else { callee_slot + 1 };
        let args_len = arg_count as usize + usize::from(is_method);
        let args: Vec<Value> = self.stack[args_start..args_start + args_len].to_vec();
        let result = func(self, &args);
        if matches!(result, Value::Error) {
            let msg = self.pending_native_error.take().unwrap_or_else(|| "native call failed".to_string());
            return Err(VmError::Native(msg));
        }
        self.stack.truncate(callee_slot);
        self.stack.push(result);
        self.collect_if_needed();
        Ok(())
    }

    fn call_class(&mut self, class_ref: ObjRef, callee_slot: usize, arg_count: u8) -> VmResult<()> {
        let (kind, init) = {
            let c = self.heap.as_class(class_ref).unwrap();
            (c.kind, c.methods.get(self.init_string, self.init_hash))
        };
        let payload = match kind {
            ClassKind::Plain | ClassKind::Str => InstancePayload::None,
            ClassKind::List => InstancePayload::List(Vec::new()),
        };
        self.heap.open_nursery();
        let instance =
            self.heap.alloc(ObjKind::Instance(InstanceObj { class: class_ref, fields: Table::new(), payload }));
        self.heap.close_nursery();
        self.stack[callee_slot] = Value::Obj(instance);
        match init {
            Some(Value::Obj(init_ref)) if self.heap.as_closure(init_ref).is_some() => {
                self.call_closure(init_ref, callee_slot, arg_count)
            }
            Some(Value::Obj(init_ref)) if self.heap.as_native(init_ref).is_some() => {
                self.call_native(init_ref, callee_slot, arg_count)
            }
            _ => {
                if arg_count != 0 {
                    return Err(VmError::Arity(format!("Expected 0 arguments but got {arg_count}.")));
                }
                self.collect_if_needed();
                Ok(())
            }
        }
    }

    fn call_bound_method(&mut self, bound_ref: ObjRef, callee_slot: usize, arg_count: u8) -> VmResult<()> {
        let bm = self.heap.as_bound_method(bound_ref).unwrap();
        let receiver = bm.receiver;
        let method = bm.method;
        self.stack[callee_slot] = receiver;
        match method {
            Value::Obj(mr) if self.heap.as_closure(mr).is_some() => self.call_closure(mr, callee_slot, arg_count),
            Value::Obj(mr) if self.heap.as_native(mr).is_some() => self.call_native(mr, callee_slot, arg_count),
            _ => Err(VmError::Type("Can only call functions and classes.".to_string())),
        }
    }

    // ---- property / index access -----------------------------------------

    fn bind_method(&mut self, class_ref: ObjRef, name_ref: ObjRef, receiver: Value) -> VmResult<()> {
        let hash = self.heap.string_hash(name_ref);
        let method = self.heap.as_class(class_ref).unwrap().methods.get(name_ref, hash).ok_or_else(|| {
            VmError::Lookup(format!("Undefined property '{}'.", self.heap.string_bytes(name_ref).unwrap_or("")))
        })?;
        self.heap.open_nursery();
        let bound = self.heap.alloc(ObjKind::BoundMethod(BoundMethodObj { receiver, method }));
        self.heap.close_nursery();
        self.stack.pop();
        self.stack.push(Value::Obj(bound));
        self.collect_if_needed();
        Ok(())
    }

    fn get_property(&mut self) -> VmResult<()> {
        let name_ref = self.read_string_constant();
        let receiver = *self.stack.last().unwrap();
        match receiver {
            Value::Obj(r) if self.heap.as_instance(r).is_some() => {
                let hash = self.heap.string_hash(name_ref);
                let field = self.heap.as_instance(r).unwrap().fields.get(name_ref, hash);
                if let Some(v) = field {
                    self.stack.pop();
                    self.stack.push(v);
                    return Ok(());
                }
                let class_ref = self.heap.as_instance(r).unwrap().class;
                self.bind_method(class_ref, name_ref, receiver)
            }
            Value::Obj(r) if matches!(self.heap.kind(r), ObjKind::String(_)) => {
                let class_ref = self
                    .string_class
                    .ok_or_else(|| VmError::Type("Only instances and strings have properties.".to_string()))?;
                self.bind_method(class_ref, name_ref, receiver)
            }
            _ => Err(VmError::Type("Only instances and strings have properties.".to_string())),
        }
    }

    fn set_property(&mut self) -> VmResult<()> {
        let name_ref = self.read_string_constant();
        let value = self.stack.pop().unwrap();
        let receiver = self.stack.pop().unwrap();
        match receiver {
            Value::Obj(r) if self.heap.as_instance(r).is_some() => {
                let hash = self.heap.string_hash(name_ref);
                self.heap.as_instance_mut(r).unwrap().fields.set(name_ref, hash, value);
                self.stack.push(value);
                Ok(())
            }
            _ => Err(VmError::Type("Only instances have fields.".to_string())),
        }
    }

    fn expect_list(&self, receiver: Value) -> VmResult<(ObjRef, usize)> {
        match receiver {
            Value::Obj(r) if self.heap.as_instance(r).and_then(|i| i.as_list()).is_some() => {
                Ok((r, self.heap.as_instance(r).unwrap().as_list().unwrap().len()))
            }
            _ => Err(VmError::Type("Only lists support indexing.".to_string())),
        }
    }

    fn resolve_index(&self, index_v: Value, len: usize) -> VmResult<usize> {
        let n = match index_v {
            Value::Number(n) if n.trunc() == n => n as i64,
            _ => return Err(VmError::Index("Index must be an integer.".to_string())),
        };
        let m = len as i64;
        let resolved = if n < 0 { n + m } else { n };
        if resolved < 0 || resolved >= m {
            return Err(VmError::Index(format!(
                "tried to access index {n}, but valid range is [0..{}] or [-{}..-1]",
                m - 1,
                m
            )));
        }
        Ok(resolved as usize)
    }

    fn get_index(&mut self) -> VmResult<()> {
        let index_v = self.stack.pop().unwrap();
        let receiver = self.stack.pop().unwrap();
        let (list_ref, len) = self.expect_list(receiver)?;
        let idx = self.resolve_index(index_v, len)?;
        let value = self.heap.as_instance(list_ref).unwrap().as_list().unwrap()[idx];
        self.stack.push(value);
        Ok(())
    }

    fn set_index(&mut self) -> VmResult<()> {
        let value = self.stack.pop().unwrap();
        let index_v = self.stack.pop().unwrap();
        let receiver = self.stack.pop().unwrap();
        let (list_ref, len) = self.expect_list(receiver)?;
        let idx = self.resolve_index(index_v, len)?;
        self.heap.as_instance_mut(list_ref).unwrap().as_list_mut().unwrap()[idx] = value;
        self.stack.push(value);
        Ok(())
    }

    // ---- arithmetic --------------------------------------------------------

    fn pop_number(&mut self) -> VmResult<f64> {
        match self.stack.pop() {
            Some(Value::Number(n)) => Ok(n),
            _ => Err(VmError::Type("Operands must be numbers.".to_string())),
        }
    }

    fn binary_number(&mut self, f: impl Fn(f64, f64) -> Value) -> VmResult<()> {
        let b = self.pop_number()?;
        let a = self.pop_number()?;
        self.stack.push(f(a, b));
        Ok(())
    }

    fn add(&mut self) -> VmResult<()> {
        let b = *self.stack.last().unwrap();
        let a = self.stack[self.stack.len() - 2];
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.stack.pop();
                self.stack.pop();
                self.stack.push(Value::Number(x + y));
                Ok(())
            }
            (Value::Obj(x), Value::Obj(y))
                if matches!(self.heap.kind(x), ObjKind::String(_)) && matches!(self.heap.kind(y), ObjKind::String(_)) =>
            {
                self.heap.open_nursery();
                let joined = format!(
                    "{}{}",
                    self.heap.string_bytes(x).unwrap(),
                    self.heap.string_bytes(y).unwrap()
                );
                let r = self.heap.intern(&joined);
                self.heap.close_nursery();
                self.stack.pop();
                self.stack.pop();
                self.stack.push(Value::Obj(r));
                self.collect_if_needed();
                Ok(())
            }
            _ => Err(VmError::Type("Operands must be numbers.".to_string())),
        }
    }

    // ---- the dispatch loop --------------------------------------------

    fn run(&mut self) -> VmResult<()> {
        loop {
            if self.stack.len() > STACK_MAX {
                return Err(VmError::StackOverflow);
            }
            if self.trace {
                let fi = self.top_frame_index();
                let closure = self.frames[fi].closure;
                let function = self.heap.as_closure(closure).unwrap().function;
                let ip = self.frames[fi].ip;
                let mut out = String::new();
                loxide_core::disasm::disassemble_instruction(
                    &self.heap.as_function(function).unwrap().chunk,
                    ip,
                    &self.heap,
                    &mut out,
                );
                // Per-instruction tracing is a user-toggled debug feature
                // (`:toggle-tracing`), not log-level-gated observability, so
                // it goes straight to stderr rather than through `log`.
                eprintln!("{}", out.trim_end());
            }

            let byte = self.read_byte();
            let Some(op) = OpCode::from_byte(byte) else {
                return Err(VmError::Type(format!("unknown opcode {byte}")));
            };

            match op {
                OpCode::LoadConstant => {
                    let idx = self.read_byte();
                    let v = self.read_constant(idx);
                    self.stack.push(v);
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.stack.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte();
                    let base = self.frames[self.top_frame_index()].base;
                    self.stack.push(self.stack[base + slot as usize]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte();
                    let base = self.frames[self.top_frame_index()].base;
                    self.stack[base + slot as usize] = *self.stack.last().unwrap();
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte();
                    let closure = self.frames[self.top_frame_index()].closure;
                    let up_ref = self.heap.as_closure(closure).unwrap().upvalues[slot as usize];
                    let v = self.heap.upvalue_get(up_ref, &self.stack);
                    self.stack.push(v);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte();
                    let closure = self.frames[self.top_frame_index()].closure;
                    let up_ref = self.heap.as_closure(closure).unwrap().upvalues[slot as usize];
                    let v = *self.stack.last().unwrap();
                    self.heap.upvalue_set(up_ref, &mut self.stack, v);
                }
                OpCode::GetGlobal => {
                    let name_ref = self.read_string_constant();
                    let hash = self.heap.string_hash(name_ref);
                    match self.globals.get(name_ref, hash) {
                        Some(v) => self.stack.push(v),
                        None => {
                            return Err(VmError::Lookup(format!(
                                "Undefined variable '{}'.",
                                self.heap.string_bytes(name_ref).unwrap_or("")
                            )))
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name_ref = self.read_string_constant();
                    let hash = self.heap.string_hash(name_ref);
                    let v = *self.stack.last().unwrap();
                    if self.globals.set(name_ref, hash, v) {
                        self.globals.delete(name_ref, hash);
                        return Err(VmError::Lookup(format!(
                            "Undefined variable '{}'.",
                            self.heap.string_bytes(name_ref).unwrap_or("")
                        )));
                    }
                }
                OpCode::DefineGlobal => {
                    let name_ref = self.read_string_constant();
                    let hash = self.heap.string_hash(name_ref);
                    let v = self.stack.pop().unwrap();
                    self.globals.set(name_ref, hash, v);
                }
                OpCode::GetProperty => self.get_property()?,
                OpCode::SetProperty => self.set_property()?,
                OpCode::GetIndex => self.get_index()?,
                OpCode::SetIndex => self.set_index()?,
                OpCode::Equal => {
                    let b = self.stack.pop().unwrap();
                    let a = self.stack.pop().unwrap();
                    self.stack.push(Value::Bool(Value::values_equal(a, b)));
                }
                OpCode::Greater => self.binary_number(|a, b| Value::Bool(a > b))?,
                OpCode::Less => self.binary_number(|a, b| Value::Bool(a < b))?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number(|a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.binary_number(|a, b| Value::Number(a * b))?,
                OpCode::Divide => self.binary_number(|a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let v = self.stack.pop().unwrap();
                    self.stack.push(Value::Bool(!v.is_truthy()));
                }
                OpCode::Negate => {
                    let n = self.pop_number()?;
                    self.stack.push(Value::Number(-n));
                }
                OpCode::Print => self.print_value(false),
                OpCode::Println => self.print_value(true),
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frames[self.top_frame_index()].ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if !self.stack.last().unwrap().is_truthy() {
                        self.frames[self.top_frame_index()].ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frames[self.top_frame_index()].ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee_slot = self.stack.len() - 1 - arg_count as usize;
                    self.call_value(callee_slot, arg_count)?;
                }
                OpCode::NewClosure => self.new_closure()?,
                OpCode::NewClass => {
                    let name_ref = self.read_string_constant();
                    self.heap.open_nursery();
                    let class_ref = self.heap.alloc(ObjKind::Class(ClassObj {
                        name: name_ref,
                        methods: Table::new(),
                        kind: ClassKind::Plain,
                    }));
                    self.heap.close_nursery();
                    self.stack.push(Value::Obj(class_ref));
                    self.collect_if_needed();
                }
                OpCode::NewMethod => {
                    let name_ref = self.read_string_constant();
                    let method_val = self.stack.pop().unwrap();
                    let class_ref = self.stack.last().unwrap().as_obj().expect("class below method on stack");
                    let hash = self.heap.string_hash(name_ref);
                    self.heap.as_class_mut(class_ref).unwrap().methods.set(name_ref, hash, method_val);
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.heap.close_upvalues_from(top, &self.stack);
                    self.stack.pop();
                }
                OpCode::Return => {
                    let result = self.stack.pop().unwrap();
                    let base = self.frames[self.top_frame_index()].base;
                    self.heap.close_upvalues_from(base, &self.stack);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        self.stack.pop();
                        return Ok(());
                    }
                    self.stack.truncate(base);
                    self.stack.push(result);
                }
            }
        }
    }

    fn new_closure(&mut self) -> VmResult<()> {
        let idx = self.read_byte();
        let func_val = self.read_constant(idx);
        let function_ref = func_val.as_obj().expect("NEW_CLOSURE constant must be a function");
        let upvalue_count = self.heap.as_function(function_ref).unwrap().upvalue_count;
        let current_closure = self.frames[self.top_frame_index()].closure;
        let base = self.frames[self.top_frame_index()].base;
        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte();
            let index = self.read_byte();
            if is_local != 0 {
                upvalues.push(self.heap.capture_upvalue(base + index as usize));
            } else {
                let parent = self.heap.as_closure(current_closure).unwrap().upvalues[index as usize];
                upvalues.push(parent);
            }
        }
        self.heap.open_nursery();
        let closure_ref = self.heap.alloc(ObjKind::Closure(ClosureObj { function: function_ref, upvalues }));
        self.heap.close_nursery();
        self.stack.push(Value::Obj(closure_ref));
        self.collect_if_needed();
        Ok(())
    }

    /// Prints the popped value followed by a newline, skipping `nil`
    /// entirely. `PRINT` (the `print` statement) renders strings unquoted,
    /// matching the worked examples in spec.md §8; `PRINTLN` is emitted only
    /// for the REPL's bare-expression echo and quotes strings, so a typed
    /// `"hi"` is visibly distinguishable from a bare `hi` identifier's value.
    fn print_value(&mut self, quoted: bool) {
        let v = self.stack.pop().unwrap();
        if matches!(v, Value::Nil) {
            return;
        }
        if quoted {
            println!("{}", loxide_core::format::debug_repr(&self.heap, v));
        } else {
            println!("{}", loxide_core::format::display_value(&self.heap, v));
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeHost for Vm {
    fn heap(&self) -> &Heap {
        &self.heap
    }

    fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn open_nursery(&mut self) {
        self.heap.open_nursery();
    }

    fn close_nursery(&mut self) {
        self.heap.close_nursery();
    }

    fn fail(&mut self, message: String) -> Value {
        self.pending_native_error = Some(message);
        Value::Error
    }

    fn uptime_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

fn arity_message(name: &str, min_arity: u8, arity: u8, got: u8) -> String {
    if min_arity == arity {
        format!("Expected {arity} arguments for '{name}' but got {got}.")
    } else {
        format!("Expected {min_arity}..{arity} arguments for '{name}' but got {got}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loxide_core::object::{FunctionObj, Param, Signature};
    use loxide_core::{Chunk, OpCode as Op};

    fn simple_script(build: impl FnOnce(&mut Chunk)) -> (Vm, ObjRef) {
        let mut vm = Vm::new();
        let mut chunk = Chunk::new();
        build(&mut chunk);
        let signature = Signature { name: "script".to_string(), arity: 0, min_arity: 0, params: Vec::<Param>::new() };
        let function =
            vm.heap.alloc(ObjKind::Function(FunctionObj { signature, chunk, upvalue_count: 0, doc: None }));
        (vm, function)
    }

    #[test]
    fn runs_a_constant_and_returns() {
        let (mut vm, f) = simple_script(|c| {
            let idx = c.add_constant(Value::Number(41.0)).unwrap();
            c.write_op(Op::LoadConstant, 1);
            c.write_byte(idx, 1);
            c.write_op(Op::Pop, 1);
            c.write_op(Op::Nil, 1);
            c.write_op(Op::Return, 1);
        });
        assert!(vm.interpret(f).is_ok());
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn arithmetic_type_error_resets_vm() {
        let (mut vm, f) = simple_script(|c| {
            let nil_idx = c.add_constant(Value::Nil).unwrap();
            c.write_op(Op::Nil, 1);
            c.write_byte(nil_idx, 1);
            c.write_op(Op::Negate, 1);
            c.write_op(Op::Return, 1);
        });
        let err = vm.interpret(f);
        assert!(err.is_err());
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn resolve_index_out_of_range_message_on_empty_list_has_no_valid_index() {
        let (vm, _f) = simple_script(|c| {
            c.write_op(Op::Nil, 1);
            c.write_op(Op::Return, 1);
        });
        let err = vm.resolve_index(Value::Number(0.0), 0).unwrap_err();
        match err {
            VmError::Index(message) => {
                assert_eq!(message, "tried to access index 0, but valid range is [0..-1] or [-0..-1]");
            }
            other => panic!("expected VmError::Index, got {other:?}"),
        }
    }

    #[test]
    fn global_round_trip() {
        let (mut vm, f) = simple_script(|c| {
            c.write_op(Op::Nil, 1);
            c.write_op(Op::Return, 1);
        });
        vm.define_global("answer", Value::Number(42.0));
        assert!(vm.interpret(f).is_ok());
        let name = vm.heap.intern("answer");
        let hash = vm.heap.string_hash(name);
        assert!(matches!(vm.globals.get(name, hash), Some(Value::Number(n)) if n == 42.0));
    }
}
