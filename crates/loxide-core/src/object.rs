//! Heap object variants and the intrusive list header. See spec.md §3 and
//! the "Polymorphic object hierarchy" / "Intrusive object list + GC" design
//! notes in §9: rather than inheritance, `Object` is one tagged enum, and
//! objects are addressed by opaque handles into a single-owner arena (the
//! heap), never by reference-counted pointers.

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// Opaque handle to a heap-allocated object. Stable for the object's
/// lifetime; becomes dangling (and must never be dereferenced) once the
/// object is swept. Non-owning — the value stack and call frames only ever
/// hold handles, never the objects themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One formal parameter: name, an advisory type name (loxide stays
/// dynamically typed; this is documentation surfaced by `help()`), and an
/// optional default-value literal. spec.md §4.2 requires defaults to be
/// trailing-only.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_name: Option<String>,
    pub default: Option<Value>,
}

/// Shared by `Function` and `NativeFunction`: both expose a name/arity and
/// an optional docstring (spec.md §9, "Callable" capability).
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    /// Maximum accepted argument count.
    pub arity: u8,
    /// Minimum accepted argument count (`arity` minus trailing defaults).
    pub min_arity: u8,
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(name: impl Into<String>, arity: u8) -> Self {
        Signature { name: name.into(), arity, min_arity: arity, params: Vec::new() }
    }

    pub fn accepts(&self, argc: u8) -> bool {
        argc >= self.min_arity && argc <= self.arity
    }
}

/// A compiled function: produced by the compiler, not directly callable
/// (the VM always calls through a `Closure`).
pub struct FunctionObj {
    pub signature: Signature,
    pub chunk: Chunk,
    pub upvalue_count: u8,
    pub doc: Option<String>,
}

/// Capability surface a native function needs from its caller: heap access,
/// scoped GC pinning for multi-allocation natives (§5, "object nursery"),
/// and a way to signal a runtime error. Implemented by `loxide_vm::Vm`; kept
/// here (rather than in `loxide-vm`) so `NativeFn` can be a plain function
/// pointer without a dependency cycle.
pub trait NativeHost {
    fn heap(&self) -> &crate::gc::Heap;
    fn heap_mut(&mut self) -> &mut crate::gc::Heap;
    /// Open a scoped GC pin: every object allocated while open is a root.
    fn open_nursery(&mut self);
    /// Close the innermost scoped GC pin opened by `open_nursery`.
    fn close_nursery(&mut self);
    /// Signal a handled runtime error with `message`; returns the `Error`
    /// sentinel the native should return immediately.
    fn fail(&mut self, message: String) -> Value;
    /// Seconds elapsed since the VM was constructed; backs the native
    /// `clock()` built-in (spec.md §9, open question on clock semantics —
    /// resolved here as wall-clock-since-start, not CPU time).
    fn uptime_seconds(&self) -> f64;
}

/// `fn(host, args) -> Value`. `args[0]` is the receiver when `is_method`.
pub type NativeFn = fn(&mut dyn NativeHost, &[Value]) -> Value;

pub struct NativeFunctionObj {
    pub signature: Signature,
    pub doc: Option<String>,
    pub func: NativeFn,
    pub is_method: bool,
}

/// The user-visible callable for non-native functions: a function paired
/// with the upvalues it captured at creation time (spec.md §4.5).
pub struct ClosureObj {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// Where an upvalue currently reads/writes its captured variable.
pub enum UpvalueLocation {
    /// Open: still points at a live stack slot.
    Stack(usize),
    /// Closed: owns its value inline, migrated off the stack at scope end.
    Closed(Value),
}

/// spec.md §4.5: at most one open upvalue per slot; the open list is sorted
/// by descending stack slot so `capture_upvalue` can find-or-insert in one
/// pass. `next_open` threads the *open* list; it is unrelated to the heap's
/// all-objects intrusive list in `Obj::next`.
pub struct UpvalueObj {
    pub location: UpvalueLocation,
    pub next_open: Option<ObjRef>,
}

impl UpvalueObj {
    pub fn slot(&self) -> Option<usize> {
        match self.location {
            UpvalueLocation::Stack(s) => Some(s),
            UpvalueLocation::Closed(_) => None,
        }
    }
}

/// Native subclasses extend the plain instance with extra payload instead
/// of using inheritance (spec.md §3: "List ... extends Instance").
pub enum InstancePayload {
    None,
    List(Vec<Value>),
}

/// What `CALL` does when invoking a `Class` value as a constructor
/// (spec.md §4.5): the default produces a plain `Instance`; native
/// subclasses produce their own payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Plain,
    List,
    Str,
}

pub struct ClassObj {
    pub name: ObjRef,
    pub methods: Table,
    pub kind: ClassKind,
}

pub struct InstanceObj {
    pub class: ObjRef,
    pub fields: Table,
    pub payload: InstancePayload,
}

impl InstanceObj {
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match &self.payload {
            InstancePayload::List(v) => Some(v),
            InstancePayload::None => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match &mut self.payload {
            InstancePayload::List(v) => Some(v),
            InstancePayload::None => None,
        }
    }
}

/// Produced when a method is accessed via `.` on an instance rather than
/// called immediately (spec.md §4.5, `GET_PROPERTY`).
pub struct BoundMethodObj {
    pub receiver: Value,
    pub method: Value,
}

/// A FNV-1a-hashed, length-prefixed, interned byte string.
pub struct LString {
    pub bytes: Box<str>,
    pub hash: u32,
}

pub enum ObjKind {
    String(LString),
    Function(FunctionObj),
    NativeFunction(NativeFunctionObj),
    Closure(ClosureObj),
    Upvalue(UpvalueObj),
    Class(ClassObj),
    Instance(InstanceObj),
    BoundMethod(BoundMethodObj),
}

impl ObjKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjKind::String(_) => "string",
            ObjKind::Function(_) => "function",
            ObjKind::NativeFunction(_) => "native function",
            ObjKind::Closure(_) => "function",
            ObjKind::Upvalue(_) => "upvalue",
            ObjKind::Class(_) => "class",
            ObjKind::Instance(_) => "instance",
            ObjKind::BoundMethod(_) => "bound method",
        }
    }
}

/// The common header every heap object carries: its payload, whether the
/// last mark phase reached it, and the next link in the VM's single
/// intrusive list of every live object (spec.md §3 invariants).
pub struct Obj {
    pub kind: ObjKind,
    pub is_alive: bool,
    pub next: Option<ObjRef>,
}

/// FNV-1a over raw bytes, matching clox's string hashing so behavior (e.g.
/// which bucket a key lands in) is not observable by a script either way,
/// but keeping faith with the reference semantics.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic() {
        assert_eq!(fnv1a(b"foo"), fnv1a(b"foo"));
        assert_ne!(fnv1a(b"foo"), fnv1a(b"bar"));
    }

    #[test]
    fn signature_arity_window() {
        let mut sig = Signature::new("f", 3);
        sig.min_arity = 1;
        assert!(sig.accepts(1));
        assert!(sig.accepts(3));
        assert!(!sig.accepts(0));
        assert!(!sig.accepts(4));
    }
}
