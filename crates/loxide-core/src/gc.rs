//! The heap: a single-owner arena of [`Obj`]s addressed by [`ObjRef`]
//! handles, the tracing mark-sweep collector, the heap-growth trigger, and
//! the scoped GC pin ("object nursery"). See spec.md §5 and §9
//! ("Intrusive object list + GC").

use crate::object::{
    BoundMethodObj, ClassObj, ClosureObj, FunctionObj, InstanceObj, InstancePayload, LString,
    NativeFunctionObj, Obj, ObjKind, ObjRef, UpvalueLocation, UpvalueObj,
};
use crate::table::Table;
use crate::value::Value;

const INITIAL_GC_THRESHOLD: usize = 1 << 20;
const GROW_FACTOR: usize = 2;

/// Generates a pair of typed down-casting accessors for one `ObjKind` arm.
macro_rules! accessor {
    ($name:ident, $name_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, r: ObjRef) -> Option<&$ty> {
            match &self.obj(r).kind {
                ObjKind::$variant(v) => Some(v),
                _ => None,
            }
        }
        pub fn $name_mut(&mut self, r: ObjRef) -> Option<&mut $ty> {
            match &mut self.obj_mut(r).kind {
                ObjKind::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

/// Roots owned by the VM (or, at compile time, by the function-compiler
/// stack) that the heap cannot see on its own. The open-upvalue list and
/// the object nursery are heap-internal and are marked without help.
pub struct Roots<'a> {
    pub stack: &'a [Value],
    pub frame_closures: &'a [ObjRef],
    pub globals: &'a Table,
    /// Anything else that must survive: `init_string`, `string_class`,
    /// `list_class`, pinned function objects on the compiler stack, etc.
    pub extra: &'a [ObjRef],
}

pub struct Heap {
    objects: Vec<Option<Obj>>,
    free_slots: Vec<u32>,
    head: Option<ObjRef>,
    open_upvalues: Option<ObjRef>,
    strings: Table,
    bytes_allocated: usize,
    next_gc_threshold: usize,
    stress_gc: bool,
    nursery_depth: u32,
    nursery_end: Option<ObjRef>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            open_upvalues: None,
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc_threshold: INITIAL_GC_THRESHOLD,
            stress_gc: false,
            nursery_depth: 0,
            nursery_end: None,
        }
    }

    pub fn set_stress_gc(&mut self, on: bool) {
        self.stress_gc = on;
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc_threshold(&self) -> usize {
        self.next_gc_threshold
    }

    pub fn should_collect(&self) -> bool {
        self.stress_gc || self.bytes_allocated > self.next_gc_threshold
    }

    // ---- allocation -----------------------------------------------------

    fn obj(&self, r: ObjRef) -> &Obj {
        self.objects[r.index()].as_ref().expect("dangling ObjRef")
    }

    fn obj_mut(&mut self, r: ObjRef) -> &mut Obj {
        self.objects[r.index()].as_mut().expect("dangling ObjRef")
    }

    pub fn alloc(&mut self, kind: ObjKind) -> ObjRef {
        self.bytes_allocated += approx_size(&kind);
        let obj = Obj { kind, is_alive: false, next: self.head };
        let r = if let Some(idx) = self.free_slots.pop() {
            self.objects[idx as usize] = Some(obj);
            ObjRef(idx)
        } else {
            self.objects.push(Some(obj));
            ObjRef((self.objects.len() - 1) as u32)
        };
        self.head = Some(r);
        r
    }

    /// Interns `s`, returning the existing handle if an equal string is
    /// already present (spec.md §4.4, `find_string`).
    pub fn intern(&mut self, s: &str) -> ObjRef {
        let hash = crate::object::fnv1a(s.as_bytes());
        let strings = std::mem::take(&mut self.strings);
        let found = strings.find_string(self, s, hash);
        self.strings = strings;
        if let Some(existing) = found {
            return existing;
        }
        let r = self.alloc(ObjKind::String(LString { bytes: s.into(), hash }));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    // ---- scoped GC pin ("object nursery") -------------------------------

    pub fn open_nursery(&mut self) {
        if self.nursery_depth == 0 {
            self.nursery_end = self.head;
        }
        self.nursery_depth += 1;
    }

    pub fn close_nursery(&mut self) {
        self.nursery_depth = self.nursery_depth.saturating_sub(1);
    }

    // ---- open upvalues ---------------------------------------------------

    pub fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut prev: Option<ObjRef> = None;
        let mut cur = self.open_upvalues;
        while let Some(c) = cur {
            let upv = self.as_upvalue(c).expect("open list entry must be an upvalue");
            match upv.slot() {
                Some(s) if s == slot => return c,
                Some(s) if s < slot => break,
                _ => {}
            }
            prev = Some(c);
            cur = upv.next_open;
        }
        let new_ref = self.alloc(ObjKind::Upvalue(UpvalueObj {
            location: UpvalueLocation::Stack(slot),
            next_open: cur,
        }));
        match prev {
            Some(p) => self.as_upvalue_mut(p).unwrap().next_open = Some(new_ref),
            None => self.open_upvalues = Some(new_ref),
        }
        new_ref
    }

    /// Closes every open upvalue at or above `from_slot`, migrating its
    /// value off the stack (spec.md §4.5, `close_upvalues`).
    pub fn close_upvalues_from(&mut self, from_slot: usize, stack: &[Value]) {
        loop {
            let Some(c) = self.open_upvalues else { break };
            let slot = match self.as_upvalue(c).and_then(|u| u.slot()) {
                Some(s) => s,
                None => break,
            };
            if slot < from_slot {
                break;
            }
            let value = stack[slot];
            let next = self.as_upvalue(c).unwrap().next_open;
            let upv = self.as_upvalue_mut(c).unwrap();
            upv.location = UpvalueLocation::Closed(value);
            upv.next_open = None;
            self.open_upvalues = next;
        }
    }

    pub fn upvalue_get(&self, r: ObjRef, stack: &[Value]) -> Value {
        match &self.as_upvalue(r).unwrap().location {
            UpvalueLocation::Stack(s) => stack[*s],
            UpvalueLocation::Closed(v) => *v,
        }
    }

    pub fn upvalue_set(&mut self, r: ObjRef, stack: &mut [Value], value: Value) {
        match &mut self.as_upvalue_mut(r).unwrap().location {
            UpvalueLocation::Stack(s) => stack[*s] = value,
            loc @ UpvalueLocation::Closed(_) => *loc = UpvalueLocation::Closed(value),
        }
    }

    // ---- typed accessors --------------------------------------------------

    pub fn is_alive(&self, r: ObjRef) -> bool {
        self.objects.get(r.index()).and_then(|o| o.as_ref()).map(|o| o.is_alive).unwrap_or(false)
    }

    pub fn kind(&self, r: ObjRef) -> &ObjKind {
        &self.obj(r).kind
    }

    pub fn string_bytes(&self, r: ObjRef) -> Option<&str> {
        match &self.obj(r).kind {
            ObjKind::String(s) => Some(&s.bytes),
            _ => None,
        }
    }

    pub fn string_hash(&self, r: ObjRef) -> u32 {
        match &self.obj(r).kind {
            ObjKind::String(s) => s.hash,
            _ => 0,
        }
    }

    accessor!(as_function, as_function_mut, Function, FunctionObj);
    accessor!(as_native, as_native_mut, NativeFunction, NativeFunctionObj);
    accessor!(as_closure, as_closure_mut, Closure, ClosureObj);
    accessor!(as_upvalue, as_upvalue_mut, Upvalue, UpvalueObj);
    accessor!(as_class, as_class_mut, Class, ClassObj);
    accessor!(as_instance, as_instance_mut, Instance, InstanceObj);
    accessor!(as_bound_method, as_bound_method_mut, BoundMethod, BoundMethodObj);

    // ---- mark-sweep collection ---------------------------------------

    fn mark_object(&mut self, gray: &mut Vec<ObjRef>, r: ObjRef) {
        let obj = self.obj_mut(r);
        if obj.is_alive {
            return;
        }
        obj.is_alive = true;
        gray.push(r);
    }

    fn mark_value(&mut self, gray: &mut Vec<ObjRef>, v: Value) {
        if let Value::Obj(r) = v {
            self.mark_object(gray, r);
        }
    }

    fn blacken(&mut self, gray: &mut Vec<ObjRef>, r: ObjRef) {
        let mut refs: Vec<Value> = Vec::new();
        match &self.obj(r).kind {
            ObjKind::String(_) | ObjKind::NativeFunction(_) => {}
            ObjKind::Function(f) => refs.extend(f.chunk.constants.iter().copied()),
            ObjKind::Closure(c) => {
                refs.push(Value::Obj(c.function));
                refs.extend(c.upvalues.iter().map(|u| Value::Obj(*u)));
            }
            ObjKind::Upvalue(u) => {
                if let UpvalueLocation::Closed(v) = &u.location {
                    refs.push(*v);
                }
            }
            ObjKind::Class(c) => {
                refs.push(Value::Obj(c.name));
                for (k, v) in c.methods.iter() {
                    refs.push(Value::Obj(k));
                    refs.push(v);
                }
            }
            ObjKind::Instance(i) => {
                refs.push(Value::Obj(i.class));
                for (k, v) in i.fields.iter() {
                    refs.push(Value::Obj(k));
                    refs.push(v);
                }
                if let InstancePayload::List(items) = &i.payload {
                    refs.extend(items.iter().copied());
                }
            }
            ObjKind::BoundMethod(b) => {
                refs.push(b.receiver);
                refs.push(b.method);
            }
        }
        for v in refs {
            self.mark_value(gray, v);
        }
    }

    /// Runs one full tricolor mark-sweep cycle (spec.md §5, GC algorithm).
    pub fn collect_garbage(&mut self, roots: Roots<'_>) {
        let mut gray: Vec<ObjRef> = Vec::new();

        for v in roots.stack {
            self.mark_value(&mut gray, *v);
        }
        for r in roots.frame_closures {
            self.mark_object(&mut gray, *r);
        }
        for (k, v) in roots.globals.iter() {
            self.mark_object(&mut gray, k);
            self.mark_value(&mut gray, v);
        }
        for r in roots.extra {
            self.mark_object(&mut gray, *r);
        }

        // The nursery pins the prefix of the live list from `head` up to
        // (not including) `nursery_end`.
        if self.nursery_depth > 0 {
            let mut cur = self.head;
            while let Some(c) = cur {
                if Some(c) == self.nursery_end {
                    break;
                }
                let next = self.obj(c).next;
                self.mark_object(&mut gray, c);
                cur = next;
            }
        }

        // Every open upvalue is a root regardless of whether it is on the
        // value stack (a still-executing frame may have captured a local
        // that this same collection is about to sweep away otherwise).
        let mut cur = self.open_upvalues;
        while let Some(c) = cur {
            self.mark_object(&mut gray, c);
            cur = self.as_upvalue(c).unwrap().next_open;
        }

        while let Some(r) = gray.pop() {
            self.blacken(&mut gray, r);
        }

        let mut strings = std::mem::take(&mut self.strings);
        strings.remove_dead(self);
        self.strings = strings;

        self.sweep();
        self.next_gc_threshold = self.bytes_allocated * GROW_FACTOR;
    }

    fn sweep(&mut self) {
        let mut prev: Option<ObjRef> = None;
        let mut current = self.head;
        while let Some(cur) = current {
            let (alive, next, size) = {
                let obj = self.objects[cur.index()].as_ref().unwrap();
                (obj.is_alive, obj.next, approx_size(&obj.kind))
            };
            if alive {
                self.objects[cur.index()].as_mut().unwrap().is_alive = false;
                prev = Some(cur);
                current = next;
            } else {
                match prev {
                    Some(p) => self.objects[p.index()].as_mut().unwrap().next = next,
                    None => self.head = next,
                }
                if self.nursery_end == Some(cur) {
                    self.nursery_end = next;
                }
                self.objects[cur.index()] = None;
                self.free_slots.push(cur.0);
                self.bytes_allocated = self.bytes_allocated.saturating_sub(size);
                current = next;
            }
        }
    }
}

/// A rough accounting size, just enough to drive the heap-growth trigger;
/// loxide does not model an exact allocator, per the teacher's own
/// `bytes_allocated` bookkeeping in its reallocator wrapper.
fn approx_size(kind: &ObjKind) -> usize {
    use std::mem::size_of;
    match kind {
        ObjKind::String(s) => size_of::<LString>() + s.bytes.len(),
        ObjKind::Function(f) => {
            size_of::<FunctionObj>() + f.chunk.code.len() + f.chunk.constants.len() * size_of::<Value>()
        }
        ObjKind::NativeFunction(_) => size_of::<NativeFunctionObj>(),
        ObjKind::Closure(c) => size_of::<ClosureObj>() + c.upvalues.len() * size_of::<ObjRef>(),
        ObjKind::Upvalue(_) => size_of::<UpvalueObj>(),
        ObjKind::Class(_) => size_of::<ClassObj>(),
        ObjKind::Instance(i) => {
            let payload = match &i.payload {
                InstancePayload::List(v) => v.len() * size_of::<Value>(),
                InstancePayload::None => 0,
            };
            size_of::<InstanceObj>() + payload
        }
        ObjKind::BoundMethod(_) => size_of::<BoundMethodObj>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut h = Heap::new();
        let a = h.intern("hello");
        let b = h.intern("hello");
        assert_eq!(a, b);
        let c = h.intern("world");
        assert_ne!(a, c);
    }

    #[test]
    fn unreachable_objects_are_collected() {
        let mut h = Heap::new();
        let keep_ref = h.intern("keep");
        let gone_ref = h.intern("gone-but-unreferenced-elsewhere-entirely");
        let before = h.bytes_allocated();
        let roots = Roots { stack: &[], frame_closures: &[], globals: &Table::new(), extra: &[keep_ref] };
        h.collect_garbage(roots);
        assert_eq!(h.string_bytes(keep_ref), Some("keep"));
        assert!(h.bytes_allocated() < before);
        // The freed slot is recycled by the next allocation.
        let recycled = h.intern("another one entirely");
        assert_eq!(recycled, gone_ref);
        assert_ne!(recycled, keep_ref);
    }

    #[test]
    fn capture_upvalue_is_idempotent_per_slot() {
        let mut h = Heap::new();
        let a = h.capture_upvalue(3);
        let b = h.capture_upvalue(3);
        assert_eq!(a, b);
        let c = h.capture_upvalue(1);
        assert_ne!(a, c);
    }

    #[test]
    fn closing_migrates_value_off_stack() {
        let mut h = Heap::new();
        let stack = vec![Value::Nil, Value::Nil, Value::Number(42.0)];
        let up = h.capture_upvalue(2);
        h.close_upvalues_from(2, &stack);
        assert!(matches!(h.upvalue_get(up, &[]), Value::Number(n) if n == 42.0));
    }
}
