//! Error types for the rendezvous layer.

use tether_rpc::RpcError;

use crate::PeerKey;

/// Errors raised by the broker, host, and client state machines.
///
/// Most protocol oddities (stale ids, unknown requests) are not errors at
/// all: they are logged and dropped. These variants cover the cases a
/// caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    /// The accept blob is shorter than two nonces plus the secret.
    #[error("connection data too short: {0} bytes, need {min}", min = crate::BLOB_SIZE)]
    ShortBlob(usize),

    /// No live peer behind this key.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerKey),

    /// A client-side operation was attempted by a peer that hosts games.
    #[error("peer is a game host, not a client")]
    NotAClient,

    /// The client has no accepted request to complete.
    #[error("no accepted arranged connection")]
    NotAccepted,

    /// Handshake or decoding failure from the RPC layer.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
