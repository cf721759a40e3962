//! Open-addressing hash table keyed by interned strings. See spec.md §4.4.
//! Used for globals, instance fields, class method tables, and (via
//! [`crate::gc::Heap`]) the weak interned-string set.

use crate::gc::Heap;
use crate::object::ObjRef;
use crate::value::Value;

const LOAD_FACTOR: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    /// `None` + `value == Nil` is an empty slot; `None` + `value == Bool(true)`
    /// is a tombstone; anything else is an occupied entry.
    key: Option<ObjRef>,
    hash: u32,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Entry { key: None, hash: 0, value: Value::Nil }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && matches!(self.value, Value::Bool(true))
    }

    fn is_empty_slot(&self) -> bool {
        self.key.is_none() && !self.is_tombstone()
    }
}

/// A resizable open-addressing table with linear probing and tombstones.
pub struct Table {
    entries: Vec<Entry>,
    /// Occupied + tombstoned slots. Tombstones count toward the load factor
    /// so a table full of deletions still gets rehashed (spec.md §4.4).
    count: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Table { entries: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Linear probe starting at `hash % capacity`. Stops at the first empty
    /// slot (terminates the search — key absent), returns the first
    /// tombstone seen as a recycle candidate if no match turns up, and
    /// returns immediately on a key match via `matches`.
    fn probe(entries: &[Entry], hash: u32, matches: impl Fn(ObjRef) -> bool) -> usize {
        let cap = entries.len();
        debug_assert!(cap > 0 && cap.is_power_of_two());
        let mut index = (hash as usize) & (cap - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                None if entry.is_empty_slot() => return tombstone.unwrap_or(index),
                None => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(k) if matches(k) => return index,
                Some(_) => {}
            }
            index = (index + 1) & (cap - 1);
        }
    }

    fn grow_if_needed(&mut self) {
        if self.entries.is_empty() {
            self.adjust_capacity(INITIAL_CAPACITY);
            return;
        }
        if (self.count + 1) as f64 > self.capacity() as f64 * LOAD_FACTOR {
            self.adjust_capacity(self.capacity() * 2);
        }
    }

    fn adjust_capacity(&mut self, new_capacity: usize) {
        let mut new_entries = vec![Entry::empty(); new_capacity];
        let mut new_count = 0;
        for entry in self.entries.iter().filter(|e| e.key.is_some()) {
            let idx = Self::probe(&new_entries, entry.hash, |k| Some(k) == entry.key);
            new_entries[idx] = *entry;
            new_count += 1;
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::probe(&self.entries, hash, |k| k == key);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    pub fn contains(&self, key: ObjRef, hash: u32) -> bool {
        self.get(key, hash).is_some()
    }

    /// Returns `true` iff `key` was not already present.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        self.grow_if_needed();
        let idx = Self::probe(&self.entries, hash, |k| k == key);
        let is_new_key = self.entries[idx].key.is_none();
        if is_new_key && self.entries[idx].is_empty_slot() {
            self.count += 1;
        }
        self.entries[idx] = Entry { key: Some(key), hash, value };
        is_new_key
    }

    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = Self::probe(&self.entries, hash, |k| k == key);
        if self.entries[idx].key.is_none() {
            return false;
        }
        self.entries[idx] = Entry { key: None, hash: 0, value: Value::Bool(true) };
        true
    }

    /// Probes by raw content instead of by an existing key handle — the one
    /// operation that looks up an interned string by its bytes rather than
    /// by object identity (spec.md §4.4, `find_string`).
    pub fn find_string(&self, heap: &Heap, bytes: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = Self::probe(&self.entries, hash, |k| heap.string_bytes(k) == Some(bytes));
        self.entries[idx].key
    }

    /// Deletes every entry whose key is no longer alive, implementing weak
    /// string references for the interned-string table (spec.md §4.4,
    /// `remove_dead_objects`, called at the end of the GC mark phase).
    pub fn remove_dead(&mut self, heap: &Heap) {
        for entry in self.entries.iter_mut() {
            if let Some(key) = entry.key {
                if !heap.is_alive(key) {
                    *entry = Entry { key: None, hash: 0, value: Value::Bool(true) };
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> ObjRef {
        ObjRef(n)
    }

    #[test]
    fn set_get_roundtrip() {
        let mut t = Table::new();
        assert!(t.set(key(1), 111, Value::Number(1.0)));
        assert!(!t.set(key(1), 111, Value::Number(2.0)));
        match t.get(key(1), 111) {
            Some(Value::Number(n)) => assert_eq!(n, 2.0),
            _ => panic!("expected Number(2.0)"),
        }
    }

    #[test]
    fn delete_then_reinsert_does_not_lose_count() {
        let mut t = Table::new();
        t.set(key(1), 1, Value::Bool(true));
        t.set(key(2), 2, Value::Bool(true));
        assert!(t.delete(key(1), 1));
        assert!(!t.delete(key(1), 1));
        assert!(t.set(key(3), 3, Value::Bool(false)));
        assert_eq!(t.get(key(2), 2).is_some(), true);
        assert_eq!(t.get(key(1), 1), None);
    }

    #[test]
    fn grows_past_load_factor() {
        let mut t = Table::new();
        for i in 0..100u32 {
            t.set(key(i), i, Value::Number(i as f64));
        }
        for i in 0..100u32 {
            assert!(t.get(key(i), i).is_some());
        }
    }
}
