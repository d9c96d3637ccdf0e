//! Per-connection string dictionary.
//!
//! Each side of a connection keeps a small dictionary of strings it has
//! sent. The first time an entry crosses the wire it travels in full and is
//! parked in a dictionary slot. Once the sender knows the packet carrying it
//! arrived, later sends of the same entry carry only the slot index:
//!
//! ```text
//! [slot: 10 bits][confirmed: 1 bit]                       confirmed
//! [slot: 10 bits][confirmed: 1 bit][string]               first send
//! ```
//!
//! Slots are recycled least-recently-used. Confirmation is tracked with
//! packet notes: every unconfirmed write is recorded, the caller takes the
//! notes when the packet is finished and later reports the packet as
//! received or dropped.

use std::collections::HashMap;

use tether_wire::{BitStream, MarshalWith};

use crate::{StringTable, StringTableEntry, StringTableError};

/// Number of dictionary slots per direction.
pub const ENTRY_COUNT: usize = 1024;

/// Bits needed to address a slot.
pub const ENTRY_BITS: u32 = 10;

const HEAD: usize = ENTRY_COUNT;
const TAIL: usize = ENTRY_COUNT + 1;

#[derive(Default)]
struct LocalSlot {
    entry: Option<StringTableEntry>,
    confirmed: bool,
}

/// One unconfirmed string written into a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PacketNote {
    slot: usize,
    string_index: u32,
}

/// The unconfirmed strings written into one packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketNotes(Vec<PacketNote>);

impl PacketNotes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stream-local dictionary for one connection.
pub struct ConnectionStringTable {
    table: StringTable,
    local: Vec<LocalSlot>,
    /// LRU links over `local`, with `HEAD` and `TAIL` sentinels.
    /// `next[HEAD]` is the least recently used slot.
    next: Vec<usize>,
    prev: Vec<usize>,
    /// Interned index → local slot holding it.
    by_string: HashMap<u32, usize>,
    remote: Vec<Option<StringTableEntry>>,
    pending: Vec<PacketNote>,
}

impl ConnectionStringTable {
    pub fn new(table: StringTable) -> Self {
        let mut next = vec![0; ENTRY_COUNT + 2];
        let mut prev = vec![0; ENTRY_COUNT + 2];
        for i in 0..ENTRY_COUNT {
            next[i] = i + 1;
            prev[i] = if i == 0 { HEAD } else { i - 1 };
        }
        next[ENTRY_COUNT - 1] = TAIL;
        next[HEAD] = 0;
        prev[TAIL] = ENTRY_COUNT - 1;

        Self {
            table,
            local: (0..ENTRY_COUNT).map(|_| LocalSlot::default()).collect(),
            next,
            prev,
            by_string: HashMap::new(),
            remote: (0..ENTRY_COUNT).map(|_| None).collect(),
            pending: Vec::new(),
        }
    }

    /// The interned table backing this dictionary.
    pub fn table(&self) -> &StringTable {
        &self.table
    }

    fn unlink(&mut self, slot: usize) {
        let (p, n) = (self.prev[slot], self.next[slot]);
        self.next[p] = n;
        self.prev[n] = p;
    }

    fn push_back(&mut self, slot: usize) {
        self.unlink(slot);
        let last = self.prev[TAIL];
        self.next[last] = slot;
        self.prev[slot] = last;
        self.next[slot] = TAIL;
        self.prev[TAIL] = slot;
    }

    /// Picks the slot for `entry`, evicting the least recently used slot
    /// if the entry is not already resident.
    fn slot_for(&mut self, entry: &StringTableEntry) -> usize {
        if let Some(&slot) = self.by_string.get(&entry.index()) {
            self.push_back(slot);
            return slot;
        }
        let slot = self.next[HEAD];
        self.push_back(slot);
        if let Some(old) = self.local[slot].entry.take() {
            self.by_string.remove(&old.index());
        }
        self.local[slot] = LocalSlot {
            entry: Some(entry.clone()),
            confirmed: false,
        };
        self.by_string.insert(entry.index(), slot);
        slot
    }

    /// Writes `entry`, in full unless the remote already confirmed it.
    pub fn write_entry(&mut self, stream: &mut BitStream, entry: &StringTableEntry) {
        let slot = self.slot_for(entry);
        stream.write_int(slot as u32, ENTRY_BITS);
        if !stream.write_flag(self.local[slot].confirmed) {
            stream.write_string(&entry.as_string());
            self.pending.push(PacketNote {
                slot,
                string_index: entry.index(),
            });
        }
    }

    /// Reads an entry, recording a full string in the remote slot.
    ///
    /// # Errors
    /// - [`StringTableError::Stream`] if the stream faulted.
    /// - [`StringTableError::UndefinedSlot`] if the remote referenced a
    ///   slot it never filled.
    pub fn read_entry(
        &mut self,
        stream: &mut BitStream,
    ) -> Result<StringTableEntry, StringTableError> {
        let slot = stream.read_int(ENTRY_BITS) as usize;
        if !stream.read_flag() {
            let text = stream.read_string();
            stream.check()?;
            // Keep the sender's casing even if a case variant is interned.
            self.remote[slot] = Some(self.table.insert(&text, true));
        }
        stream.check()?;
        self.remote[slot]
            .clone()
            .ok_or(StringTableError::UndefinedSlot(slot as u32))
    }

    /// Takes the notes for everything written since the last call.
    /// Call once per outgoing packet.
    pub fn take_packet_notes(&mut self) -> PacketNotes {
        PacketNotes(std::mem::take(&mut self.pending))
    }

    /// The packet carrying `notes` arrived. Slots still holding the same
    /// string become confirmed.
    pub fn packet_received(&mut self, notes: PacketNotes) {
        for note in notes.0 {
            let slot = &mut self.local[note.slot];
            if slot.entry.as_ref().map(StringTableEntry::index) == Some(note.string_index) {
                slot.confirmed = true;
            }
        }
    }

    /// The packet carrying `notes` was lost. Its strings stay unconfirmed
    /// and will be sent in full again.
    pub fn packet_dropped(&mut self, notes: PacketNotes) {
        drop(notes);
    }

    /// Whether `entry` currently sits in a confirmed slot.
    pub fn is_confirmed(&self, entry: &StringTableEntry) -> bool {
        self.by_string
            .get(&entry.index())
            .is_some_and(|&slot| self.local[slot].confirmed)
    }
}

impl MarshalWith<ConnectionStringTable> for StringTableEntry {
    fn write_with(&self, stream: &mut BitStream, ctx: &mut ConnectionStringTable) {
        ctx.write_entry(stream, self);
    }

    fn read_with(stream: &mut BitStream, ctx: &mut ConnectionStringTable) -> Self {
        match ctx.read_entry(stream) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "string entry unreadable");
                stream.set_invalid();
                ctx.table().null_entry()
            }
        }
    }
}

/// Without a dictionary an entry is just its string.
impl MarshalWith<StringTable> for StringTableEntry {
    fn write_with(&self, stream: &mut BitStream, _ctx: &mut StringTable) {
        stream.write_string(&self.as_string());
    }

    fn read_with(stream: &mut BitStream, ctx: &mut StringTable) -> Self {
        let text = stream.read_string();
        ctx.insert(&text, true)
    }
}
