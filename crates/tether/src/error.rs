//! Unified error type for Tether.

use tether_rendezvous::RendezvousError;
use tether_rpc::RpcError;
use tether_strings::StringTableError;
use tether_transport::TransportError;
use tether_wire::WireError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A value could not be read off the wire.
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Strings(#[from] StringTableError),

    /// Call decoding, version mismatch, or handshake refusal.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),

    /// A config file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// A config file is not valid JSON for its type.
    #[error("config parse: {0}")]
    Config(#[from] serde_json::Error),

    /// The remote end did not answer in time.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The broker task is gone.
    #[error("broker unavailable")]
    BrokerUnavailable,
}
