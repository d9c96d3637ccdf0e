//! RPC layer for Tether.
//!
//! A remote call is a value: one [`MasterMessage`] variant whose fields
//! are the call's arguments. Sending a call means encoding it into a
//! packet; receiving one means decoding it and handing it to
//! [`MasterMessage::dispatch`], which invokes the matching method of a
//! [`MasterInterface`] implementation.
//!
//! ```text
//! caller                             receiver
//! MasterMessage::X { a, b, c }       decode_packet(bytes)
//!   └─ encode_packet ─── bytes ───→    └─ msg.dispatch(&mut target)
//!                                          └─ target.x(a, b, c)
//! ```
//!
//! Calls are one-way: nothing is returned and there is no built-in
//! acknowledgement. Replies are separate calls in the other direction.
//!
//! The [`handshake`] module covers the frame exchanged before any calls:
//! protocol versions and the peer's role.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
pub mod handshake;
mod interface;
mod message;
mod packet;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::RpcError;
pub use handshake::{
    BUILD_VERSION, CS_PROTOCOL_VERSION, ConnectRequest, HandshakeReply,
    MASTER_PROTOCOL_VERSION, MIN_MASTER_PROTOCOL_VERSION, PeerRole,
    ServerInfo,
};
pub use interface::MasterInterface;
pub use message::{MESSAGE_COUNT, MasterMessage};
pub use packet::{EncodedPacket, decode_packet, encode_packet};
