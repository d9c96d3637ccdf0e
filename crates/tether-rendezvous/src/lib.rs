//! Arranged connections for Tether.
//!
//! Two peers behind NAT cannot simply dial each other. A broker both of
//! them can reach introduces them: it tells each side the other's likely
//! addresses and relays a nonce pair and secret the host generated, so the
//! direct attempt can be authenticated on both ends.
//!
//! This crate holds the three roles as plain state machines with no I/O:
//!
//! - **[`Broker`]**: peer registry, server list, request brokering with
//!   timeouts, MOTD, and global chat.
//! - **[`RendezvousHost`]**: accepts or refuses brokered requests.
//! - **[`RendezvousClient`]**: queries servers and requests introductions.
//!
//! All three consume [`MasterMessage`](tether_rpc::MasterMessage)s through
//! [`MasterInterface`](tether_rpc::MasterInterface) and produce calls for
//! the caller to send.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / PeerLink (above)  ← moves packets over WebSockets
//!     ↕
//! Rendezvous (this crate)    ← decides what to answer
//!     ↕
//! RPC (below)                ← MasterMessage, handshake
//! ```

mod arranged;
mod broker;
mod client;
mod config;
mod error;
mod host;
mod peer;
mod request;

pub use arranged::{
    ArrangedConnection, ArrangedRegistry, Arrival, BLOB_SIZE, SHARED_SECRET_SIZE,
};
pub use broker::{Broker, NO_SUCH_HOST, Outbound, TIMED_OUT, candidate_addresses};
pub use client::{CONNECT_PARAMS, ClientEvent, ClientState, RendezvousClient};
pub use config::{BrokerConfig, ClientConfig, HostConfig};
pub use error::RendezvousError;
pub use host::{BanList, RendezvousHost};
pub use peer::PeerKey;
pub use request::{ArrangedRequest, RequestTracker};
