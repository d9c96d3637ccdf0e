//! Interned strings for Tether.
//!
//! - **[`StringTable`]**: shared, reference-counted interning. Equal strings
//!   (under the requested case sensitivity) share one index.
//! - **[`StringTableEntry`]**: a counted handle to one interned string.
//!   Cloning adds a reference and dropping releases it.
//! - **[`ConnectionStringTable`]**: the per-connection dictionary that lets
//!   an entry cross the wire in full once and by slot index afterwards.

mod connection;
mod error;
mod table;

pub use connection::{ConnectionStringTable, ENTRY_BITS, ENTRY_COUNT, PacketNotes};
pub use error::StringTableError;
pub use table::{NULL_INDEX, StringTable, StringTableEntry};
