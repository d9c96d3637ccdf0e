//! # Tether
//!
//! Rendezvous broker for arranged peer-to-peer connections.
//!
//! Game hosts and clients both keep a connection open to a broker. A
//! client asks the broker to introduce it to a host; the broker forwards
//! the request along with every address the client might be reachable at,
//! relays the host's answer, and expires requests nobody answers. The
//! accepted answer carries a nonce pair and shared secret both sides use
//! to recognise each other when they connect directly.
//!
//! The layers live in their own crates and are re-exported here:
//!
//! - `tether-wire`: bit stream and marshalling
//! - `tether-strings`: interned strings and per-connection dictionaries
//! - `tether-rpc`: the call set, packet codec, and handshake
//! - `tether-rendezvous`: broker, host, and client state machines
//! - `tether-transport`: WebSocket frames
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! tether::init_tracing();
//! let server = BrokerServer::builder().bind("0.0.0.0:28000").build().await?;
//! server.run().await
//! # }
//! ```

mod actor;
mod config;
mod error;
mod handler;
mod link;
mod server;
mod telemetry;

pub use actor::{BrokerHandle, BrokerStats};
pub use config::ServerConfig;
pub use error::TetherError;
pub use link::PeerLink;
pub use server::{BrokerServer, BrokerServerBuilder};
pub use telemetry::init_tracing;

pub use tether_rendezvous as rendezvous;
pub use tether_rpc as rpc;
pub use tether_strings as strings;
pub use tether_transport as transport;
pub use tether_wire as wire;

/// Everything needed to run a broker or link a peer to one.
pub mod prelude {
    pub use crate::{
        BrokerHandle, BrokerServer, BrokerServerBuilder, BrokerStats, PeerLink, ServerConfig,
        TetherError,
    };
    pub use tether_rendezvous::{
        ArrangedConnection, ArrangedRegistry, Arrival, BrokerConfig, ClientConfig, ClientEvent,
        ClientState, HostConfig, PeerKey, RendezvousClient, RendezvousHost,
    };
    pub use tether_rpc::{ConnectRequest, HandshakeReply, MasterInterface, MasterMessage, ServerInfo};
    pub use tether_strings::{StringTable, StringTableEntry};
    pub use tether_wire::{ByteBuffer, IpAddress, Nonce};
}
