//! Wire format for Tether.
//!
//! This crate is the bottom of the stack. Everything that travels between a
//! peer and the rendezvous broker goes through it:
//!
//! - **[`BitStream`]**: bit-exact reading and writing at arbitrary widths,
//!   with a sticky fault flag instead of read errors.
//! - **[`Marshal`] / [`MarshalWith`]**: per-type encode/decode on top of the
//!   stream. This covers scalars, strings, byte buffers, addresses, nonces,
//!   and escape-encoded sequences.
//! - **Wrappers** ([`Int`], [`SignedInt`], [`Float`], [`SignedFloat`],
//!   [`RangedU32`]): types that carry their own bit width.
//! - **[`WireError`]**: what a caller reports after checking a faulted
//!   stream.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Wire (bits ↔ values) → RPC (calls) → Rendezvous
//! ```
//!
//! The wire layer knows nothing about messages or connections. It turns
//! values into bits and back, identically on both ends.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod address;
mod bitstream;
mod buffer;
mod error;
mod marshal;
mod nonce;
mod wrappers;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use address::IpAddress;
pub use bitstream::{BitStream, MAX_STRING_LEN, ranged_bit_count};
pub use buffer::{BYTE_BUFFER_LEN_BITS, ByteBuffer, MAX_BYTE_BUFFER_LEN};
pub use error::WireError;
pub use marshal::{
    MAX_SEQUENCE_LEN, Marshal, MarshalWith, SEQUENCE_BASE_BITS,
    SEQUENCE_ESCAPE, SEQUENCE_EXT_BITS, read_sequence_len,
    write_sequence_len,
};
pub use nonce::{NONCE_SIZE, Nonce};
pub use wrappers::{Float, Int, RangedU32, SignedFloat, SignedInt};
