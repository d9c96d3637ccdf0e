//! Connection setup between a peer and the broker.
//!
//! The first frame a peer sends is a [`ConnectRequest`]: protocol versions,
//! a build number, and who the peer is. The broker answers with a
//! [`HandshakeReply`] before any RPC traffic flows.
//!
//! ```text
//! [master_version: u32][cs_version: u32][build: u32][is_server: 1]
//!   server: [bots][players][max][info_flags][level][level_type][name][descr]
//!   client: [player_name]
//! ```
//!
//! Only the master protocol version gates the connection. A mismatched
//! client-server version is accepted but keeps the peer from seeing (or
//! being listed to) hosts of a different version.

use tether_wire::{BitStream, Marshal};

use crate::RpcError;

/// Master protocol version spoken by this build.
pub const MASTER_PROTOCOL_VERSION: u32 = 6;

/// Oldest master protocol version the broker still accepts.
pub const MIN_MASTER_PROTOCOL_VERSION: u32 = 4;

/// Client-server (game) protocol version spoken by this build.
pub const CS_PROTOCOL_VERSION: u32 = 1;

/// Monotonic build number.
pub const BUILD_VERSION: u32 = 1;

/// What a game host reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub bot_count: u32,
    pub player_count: u32,
    pub max_players: u32,
    pub info_flags: u32,
    pub level_name: String,
    pub level_type: String,
    pub name: String,
    pub description: String,
}

/// Who is connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRole {
    Client { player_name: String },
    Server(ServerInfo),
}

impl PeerRole {
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Player nick or server name.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Client { player_name } => player_name,
            Self::Server(info) => &info.name,
        }
    }
}

/// First frame from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub master_protocol_version: u32,
    pub cs_protocol_version: u32,
    pub build: u32,
    pub role: PeerRole,
}

impl ConnectRequest {
    /// A request at this build's versions.
    pub fn new(role: PeerRole) -> Self {
        Self {
            master_protocol_version: MASTER_PROTOCOL_VERSION,
            cs_protocol_version: CS_PROTOCOL_VERSION,
            build: BUILD_VERSION,
            role,
        }
    }

    pub fn client(player_name: impl Into<String>) -> Self {
        Self::new(PeerRole::Client {
            player_name: player_name.into(),
        })
    }

    pub fn server(info: ServerInfo) -> Self {
        Self::new(PeerRole::Server(info))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut s = BitStream::new();
        self.master_protocol_version.write(&mut s);
        self.cs_protocol_version.write(&mut s);
        self.build.write(&mut s);
        match &self.role {
            PeerRole::Server(info) => {
                s.write_flag(true);
                info.bot_count.write(&mut s);
                info.player_count.write(&mut s);
                info.max_players.write(&mut s);
                info.info_flags.write(&mut s);
                s.write_string(&info.level_name);
                s.write_string(&info.level_type);
                s.write_string(&info.name);
                s.write_string(&info.description);
            }
            PeerRole::Client { player_name } => {
                s.write_flag(false);
                s.write_string(player_name);
            }
        }
        s.into_bytes()
    }

    /// # Errors
    /// [`RpcError::Truncated`] if the frame is short.
    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        let mut s = BitStream::from_bytes(bytes.to_vec());
        let master_protocol_version = u32::read(&mut s);
        let cs_protocol_version = u32::read(&mut s);
        let build = u32::read(&mut s);
        let role = if s.read_flag() {
            PeerRole::Server(ServerInfo {
                bot_count: u32::read(&mut s),
                player_count: u32::read(&mut s),
                max_players: u32::read(&mut s),
                info_flags: u32::read(&mut s),
                level_name: s.read_string(),
                level_type: s.read_string(),
                name: s.read_string(),
                description: s.read_string(),
            })
        } else {
            PeerRole::Client {
                player_name: s.read_string(),
            }
        };
        s.check()?;
        Ok(Self {
            master_protocol_version,
            cs_protocol_version,
            build,
            role,
        })
    }

    /// Checks the master protocol version against `min..=max`.
    ///
    /// # Errors
    /// [`RpcError::VersionMismatch`] when outside the range.
    pub fn check_version(&self, min: u32, max: u32) -> Result<(), RpcError> {
        let got = self.master_protocol_version;
        if got < min || got > max {
            return Err(RpcError::VersionMismatch { got, min, max });
        }
        Ok(())
    }
}

/// The broker's answer to a [`ConnectRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    Accepted,
    Rejected { reason: String },
}

impl HandshakeReply {
    pub fn encode(&self) -> Vec<u8> {
        let mut s = BitStream::new();
        match self {
            Self::Accepted => {
                s.write_flag(true);
            }
            Self::Rejected { reason } => {
                s.write_flag(false);
                s.write_string(reason);
            }
        }
        s.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RpcError> {
        let mut s = BitStream::from_bytes(bytes.to_vec());
        let reply = if s.read_flag() {
            Self::Accepted
        } else {
            Self::Rejected {
                reason: s.read_string(),
            }
        };
        s.check()?;
        Ok(reply)
    }

    /// `Ok` for an accept, [`RpcError::Rejected`] otherwise.
    pub fn into_result(self) -> Result<(), RpcError> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected { reason } => Err(RpcError::Rejected(reason)),
        }
    }
}
