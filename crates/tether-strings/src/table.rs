//! The interned, reference-counted string table.
//!
//! Identifiers such as player nicks and level names repeat constantly.
//! Interning them gives every distinct string one small integer index, so
//! comparing two identifiers is an integer compare and a connection can
//! refer to a string it already sent by index alone.
//!
//! # Ownership
//!
//! A [`StringTable`] is an explicit context object, not a global. Cloning
//! it clones a handle to the same shared table; the table lives until the
//! last handle (including every outstanding [`StringTableEntry`]) drops.
//! All mutation goes through one mutex, so entries can cross threads.
//!
//! # Reference counting
//!
//! ```text
//! insert("Nova") ──→ index 3, refs 1
//! entry.clone()  ──→ index 3, refs 2
//! drop(entry)    ──→ index 3, refs 1
//! drop(clone)    ──→ refs 0 → slot 3 freed, reused by the next insert
//! ```
//!
//! Index 0 is the empty string. It is never counted or freed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Index of the empty string.
pub const NULL_INDEX: u32 = 0;

struct Slot {
    string: String,
    refs: u32,
}

#[derive(Default)]
struct TableInner {
    /// Index 0 is permanently `None` (the empty string).
    slots: Vec<Option<Slot>>,
    /// Freed indices, reused LIFO.
    free: Vec<u32>,
    /// ASCII-lowercased string → every live index with that folded form.
    /// Case-insensitive lookups take the first; case-sensitive ones scan
    /// for an exact match.
    buckets: HashMap<String, Vec<u32>>,
}

impl TableInner {
    fn find(&self, s: &str, case_sensitive: bool) -> Option<u32> {
        let bucket = self.buckets.get(&s.to_ascii_lowercase())?;
        if case_sensitive {
            bucket.iter().copied().find(|&i| {
                matches!(&self.slots[i as usize], Some(slot) if slot.string == s)
            })
        } else {
            bucket.first().copied()
        }
    }

    fn allocate(&mut self, s: &str) -> u32 {
        let slot = Slot {
            string: s.to_string(),
            refs: 1,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                index
            }
            None => {
                if self.slots.is_empty() {
                    self.slots.push(None);
                }
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as u32
            }
        };
        self.buckets
            .entry(s.to_ascii_lowercase())
            .or_default()
            .push(index);
        index
    }

    fn release(&mut self, index: u32) {
        let Some(slot) = self.slots[index as usize].take() else {
            return;
        };
        let key = slot.string.to_ascii_lowercase();
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|&i| i != index);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        self.free.push(index);
    }

    fn slot_mut(&mut self, index: u32) -> Option<&mut Slot> {
        self.slots.get_mut(index as usize)?.as_mut()
    }
}

/// Shared handle to an interned string table.
#[derive(Clone, Default)]
pub struct StringTable {
    inner: Arc<Mutex<TableInner>>,
}

impl StringTable {
    /// Creates an empty table. Only the null entry exists.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        // Every update completes under one guard; poison carries no state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Interns `s`, returning a counted handle.
    ///
    /// An existing entry that matches under the requested case sensitivity
    /// gains a reference; otherwise a new entry starts at one. The empty
    /// string always maps to the null entry.
    pub fn insert(&self, s: &str, case_sensitive: bool) -> StringTableEntry {
        if s.is_empty() {
            return self.null_entry();
        }
        let mut inner = self.lock();
        let index = match inner.find(s, case_sensitive) {
            Some(index) => {
                if let Some(slot) = inner.slot_mut(index) {
                    slot.refs += 1;
                }
                index
            }
            None => inner.allocate(s),
        };
        drop(inner);
        StringTableEntry {
            table: self.clone(),
            index,
        }
    }

    /// Like [`insert`](Self::insert) but never creates an entry; a miss
    /// returns the null entry.
    pub fn lookup(&self, s: &str, case_sensitive: bool) -> StringTableEntry {
        let mut inner = self.lock();
        let index = match inner.find(s, case_sensitive) {
            Some(index) => {
                if let Some(slot) = inner.slot_mut(index) {
                    slot.refs += 1;
                }
                index
            }
            None => NULL_INDEX,
        };
        drop(inner);
        StringTableEntry {
            table: self.clone(),
            index,
        }
    }

    /// The entry for the empty string.
    pub fn null_entry(&self) -> StringTableEntry {
        StringTableEntry {
            table: self.clone(),
            index: NULL_INDEX,
        }
    }

    /// Adds a reference to `index`. No-op for the null or a freed index.
    pub fn inc_ref(&self, index: u32) {
        if index == NULL_INDEX {
            return;
        }
        if let Some(slot) = self.lock().slot_mut(index) {
            slot.refs += 1;
        }
    }

    /// Drops a reference to `index`, freeing the slot when it hits zero.
    pub fn dec_ref(&self, index: u32) {
        if index == NULL_INDEX {
            return;
        }
        let mut inner = self.lock();
        let free = match inner.slot_mut(index) {
            Some(slot) => {
                slot.refs = slot.refs.saturating_sub(1);
                slot.refs == 0
            }
            None => false,
        };
        if free {
            inner.release(index);
        }
    }

    /// The string at `index`, or `""` for the null or a freed index.
    pub fn get_string(&self, index: u32) -> String {
        self.lock()
            .slots
            .get(index as usize)
            .and_then(|s| s.as_ref())
            .map(|s| s.string.clone())
            .unwrap_or_default()
    }

    /// Current reference count (0 for the null or a freed index).
    pub fn ref_count(&self, index: u32) -> u32 {
        self.lock()
            .slots
            .get(index as usize)
            .and_then(|s| s.as_ref())
            .map_or(0, |s| s.refs)
    }

    /// Number of live (non-null) entries.
    pub fn len(&self) -> usize {
        self.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StringTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringTable")
            .field("live", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StringTableEntry
// ---------------------------------------------------------------------------

/// A counted handle to one interned string.
///
/// Two entries are equal when they name the same slot. Comparing strings
/// is never needed: interning already folded equal strings together.
pub struct StringTableEntry {
    table: StringTable,
    index: u32,
}

impl StringTableEntry {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_INDEX
    }

    /// The interned string.
    pub fn as_string(&self) -> String {
        self.table.get_string(self.index)
    }

    /// The table this entry belongs to.
    pub fn table(&self) -> &StringTable {
        &self.table
    }
}

impl Clone for StringTableEntry {
    fn clone(&self) -> Self {
        self.table.inc_ref(self.index);
        Self {
            table: self.table.clone(),
            index: self.index,
        }
    }
}

impl Drop for StringTableEntry {
    fn drop(&mut self) {
        self.table.dec_ref(self.index);
    }
}

impl PartialEq for StringTableEntry {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for StringTableEntry {}

impl std::hash::Hash for StringTableEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Display for StringTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl fmt::Debug for StringTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringTableEntry({}, {:?})", self.index, self.as_string())
    }
}
