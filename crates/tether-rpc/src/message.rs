//! The master message set.
//!
//! Every remote call between a peer and the rendezvous broker is one
//! variant of [`MasterMessage`]. The variant *is* the call: its tag names
//! the method and its fields are the arguments, in declaration order.
//!
//! ```text
//! [tag: ranged 0..MESSAGE_COUNT][arg 1][arg 2]...[arg n]
//! ```
//!
//! One generic [`encode`](MasterMessage::encode) /
//! [`decode`](MasterMessage::decode) pair covers every call, and
//! [`dispatch`](MasterMessage::dispatch) hands the decoded arguments to a
//! [`MasterInterface`](crate::MasterInterface) implementation. Argument
//! order is the wire contract: reordering fields or inserting one is a
//! protocol change.
//!
//! Direction prefixes follow the call's flow: `c2m` client to master,
//! `m2c` master to client, `s2m` server (host) to master, `m2s` master to
//! server.

use tether_strings::{ConnectionStringTable, StringTableEntry};
use tether_wire::{BitStream, ByteBuffer, IpAddress, Marshal, MarshalWith};

use crate::RpcError;

/// Number of distinct calls. Tags are `0..MESSAGE_COUNT`.
pub const MESSAGE_COUNT: u32 = 21;

/// One remote call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterMessage {
    /// Ask for the list of visible game hosts.
    C2mQueryServers { query_id: u32 },

    /// One batch of hosts. An empty batch ends the list.
    M2cQueryServersResponse {
        query_id: u32,
        servers: Vec<IpAddress>,
    },

    /// Ask the broker to introduce us to `remote_address`.
    C2mRequestArrangedConnection {
        request_id: u32,
        remote_address: IpAddress,
        internal_address: IpAddress,
        params: ByteBuffer,
    },

    /// A client wants to reach this host; here is where to find it.
    M2sClientRequestedArrangedConnection {
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        params: ByteBuffer,
    },

    /// The host accepts; `connection_data` carries nonces and secret.
    S2mAcceptArrangedConnection {
        request_id: u32,
        internal_address: IpAddress,
        connection_data: ByteBuffer,
    },

    /// The host refuses.
    S2mRejectArrangedConnection {
        request_id: u32,
        reject_data: ByteBuffer,
    },

    /// The host accepted; here is where to find it.
    M2cArrangedConnectionAccepted {
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        connection_data: ByteBuffer,
    },

    /// The host refused, vanished, or never answered.
    M2cArrangedConnectionRejected {
        request_id: u32,
        reject_data: ByteBuffer,
    },

    S2mUpdateServerStatus {
        level_name: StringTableEntry,
        level_type: StringTableEntry,
        bot_count: u32,
        player_count: u32,
        max_players: u32,
        info_flags: u32,
    },

    C2mRequestMotd,

    M2cSetMotd { master_name: String, motd: String },

    C2mJoinGlobalChat,

    C2mLeaveGlobalChat,

    M2cPlayerJoinedGlobalChat { nick: StringTableEntry },

    M2cPlayerLeftGlobalChat { nick: StringTableEntry },

    M2cPlayersInGlobalChat { nicks: Vec<StringTableEntry> },

    /// Chat line from a client. `/nick body` is a private message.
    C2mSendChat { message: String },

    M2cSendChat {
        nick: StringTableEntry,
        is_private: bool,
        message: String,
    },

    S2mChangeName { name: StringTableEntry },

    S2mServerDescription { description: StringTableEntry },

    /// Sent to a client on connect: a newer build or game protocol exists.
    M2cSendUpgradeStatus { needs_upgrade: bool },
}

impl MasterMessage {
    /// The wire tag for this call.
    pub fn id(&self) -> u32 {
        match self {
            Self::C2mQueryServers { .. } => 0,
            Self::M2cQueryServersResponse { .. } => 1,
            Self::C2mRequestArrangedConnection { .. } => 2,
            Self::M2sClientRequestedArrangedConnection { .. } => 3,
            Self::S2mAcceptArrangedConnection { .. } => 4,
            Self::S2mRejectArrangedConnection { .. } => 5,
            Self::M2cArrangedConnectionAccepted { .. } => 6,
            Self::M2cArrangedConnectionRejected { .. } => 7,
            Self::S2mUpdateServerStatus { .. } => 8,
            Self::C2mRequestMotd => 9,
            Self::M2cSetMotd { .. } => 10,
            Self::C2mJoinGlobalChat => 11,
            Self::C2mLeaveGlobalChat => 12,
            Self::M2cPlayerJoinedGlobalChat { .. } => 13,
            Self::M2cPlayerLeftGlobalChat { .. } => 14,
            Self::M2cPlayersInGlobalChat { .. } => 15,
            Self::C2mSendChat { .. } => 16,
            Self::M2cSendChat { .. } => 17,
            Self::S2mChangeName { .. } => 18,
            Self::S2mServerDescription { .. } => 19,
            Self::M2cSendUpgradeStatus { .. } => 20,
        }
    }

    /// Method name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::C2mQueryServers { .. } => "c2m_query_servers",
            Self::M2cQueryServersResponse { .. } => "m2c_query_servers_response",
            Self::C2mRequestArrangedConnection { .. } => {
                "c2m_request_arranged_connection"
            }
            Self::M2sClientRequestedArrangedConnection { .. } => {
                "m2s_client_requested_arranged_connection"
            }
            Self::S2mAcceptArrangedConnection { .. } => {
                "s2m_accept_arranged_connection"
            }
            Self::S2mRejectArrangedConnection { .. } => {
                "s2m_reject_arranged_connection"
            }
            Self::M2cArrangedConnectionAccepted { .. } => {
                "m2c_arranged_connection_accepted"
            }
            Self::M2cArrangedConnectionRejected { .. } => {
                "m2c_arranged_connection_rejected"
            }
            Self::S2mUpdateServerStatus { .. } => "s2m_update_server_status",
            Self::C2mRequestMotd => "c2m_request_motd",
            Self::M2cSetMotd { .. } => "m2c_set_motd",
            Self::C2mJoinGlobalChat => "c2m_join_global_chat",
            Self::C2mLeaveGlobalChat => "c2m_leave_global_chat",
            Self::M2cPlayerJoinedGlobalChat { .. } => {
                "m2c_player_joined_global_chat"
            }
            Self::M2cPlayerLeftGlobalChat { .. } => "m2c_player_left_global_chat",
            Self::M2cPlayersInGlobalChat { .. } => "m2c_players_in_global_chat",
            Self::C2mSendChat { .. } => "c2m_send_chat",
            Self::M2cSendChat { .. } => "m2c_send_chat",
            Self::S2mChangeName { .. } => "s2m_change_name",
            Self::S2mServerDescription { .. } => "s2m_server_description",
            Self::M2cSendUpgradeStatus { .. } => "m2c_send_upgrade_status",
        }
    }

    /// Writes the tag and then every argument in declaration order.
    pub fn encode(&self, stream: &mut BitStream, strings: &mut ConnectionStringTable) {
        stream.write_ranged_u32(self.id(), 0, MESSAGE_COUNT - 1);
        match self {
            Self::C2mQueryServers { query_id } => {
                query_id.write(stream);
            }
            Self::M2cQueryServersResponse { query_id, servers } => {
                query_id.write(stream);
                servers.write(stream);
            }
            Self::C2mRequestArrangedConnection {
                request_id,
                remote_address,
                internal_address,
                params,
            } => {
                request_id.write(stream);
                remote_address.write(stream);
                internal_address.write(stream);
                params.write(stream);
            }
            Self::M2sClientRequestedArrangedConnection {
                request_id,
                possible_addresses,
                params,
            } => {
                request_id.write(stream);
                possible_addresses.write(stream);
                params.write(stream);
            }
            Self::S2mAcceptArrangedConnection {
                request_id,
                internal_address,
                connection_data,
            } => {
                request_id.write(stream);
                internal_address.write(stream);
                connection_data.write(stream);
            }
            Self::S2mRejectArrangedConnection {
                request_id,
                reject_data,
            }
            | Self::M2cArrangedConnectionRejected {
                request_id,
                reject_data,
            } => {
                request_id.write(stream);
                reject_data.write(stream);
            }
            Self::M2cArrangedConnectionAccepted {
                request_id,
                possible_addresses,
                connection_data,
            } => {
                request_id.write(stream);
                possible_addresses.write(stream);
                connection_data.write(stream);
            }
            Self::S2mUpdateServerStatus {
                level_name,
                level_type,
                bot_count,
                player_count,
                max_players,
                info_flags,
            } => {
                level_name.write_with(stream, strings);
                level_type.write_with(stream, strings);
                bot_count.write(stream);
                player_count.write(stream);
                max_players.write(stream);
                info_flags.write(stream);
            }
            Self::C2mRequestMotd
            | Self::C2mJoinGlobalChat
            | Self::C2mLeaveGlobalChat => {}
            Self::M2cSetMotd { master_name, motd } => {
                master_name.write(stream);
                motd.write(stream);
            }
            Self::M2cPlayerJoinedGlobalChat { nick }
            | Self::M2cPlayerLeftGlobalChat { nick } => {
                nick.write_with(stream, strings);
            }
            Self::M2cPlayersInGlobalChat { nicks } => {
                nicks.write_with(stream, strings);
            }
            Self::C2mSendChat { message } => {
                message.write(stream);
            }
            Self::M2cSendChat {
                nick,
                is_private,
                message,
            } => {
                nick.write_with(stream, strings);
                is_private.write(stream);
                message.write(stream);
            }
            Self::S2mChangeName { name } => {
                name.write_with(stream, strings);
            }
            Self::S2mServerDescription { description } => {
                description.write_with(stream, strings);
            }
            Self::M2cSendUpgradeStatus { needs_upgrade } => {
                needs_upgrade.write(stream);
            }
        }
    }

    /// Reads one call written by [`encode`](Self::encode).
    ///
    /// # Errors
    /// - [`RpcError::Truncated`] if the stream ran out mid-call.
    /// - [`RpcError::UnknownMessage`] for a tag outside the message set.
    pub fn decode(
        stream: &mut BitStream,
        strings: &mut ConnectionStringTable,
    ) -> Result<Self, RpcError> {
        let id = stream.read_ranged_u32(0, MESSAGE_COUNT - 1);
        stream.check()?;

        // Struct-expression fields evaluate in source order, which is the
        // argument order on the wire.
        let message = match id {
            0 => Self::C2mQueryServers {
                query_id: u32::read(stream),
            },
            1 => Self::M2cQueryServersResponse {
                query_id: u32::read(stream),
                servers: Vec::read(stream),
            },
            2 => Self::C2mRequestArrangedConnection {
                request_id: u32::read(stream),
                remote_address: IpAddress::read(stream),
                internal_address: IpAddress::read(stream),
                params: ByteBuffer::read(stream),
            },
            3 => Self::M2sClientRequestedArrangedConnection {
                request_id: u32::read(stream),
                possible_addresses: Vec::read(stream),
                params: ByteBuffer::read(stream),
            },
            4 => Self::S2mAcceptArrangedConnection {
                request_id: u32::read(stream),
                internal_address: IpAddress::read(stream),
                connection_data: ByteBuffer::read(stream),
            },
            5 => Self::S2mRejectArrangedConnection {
                request_id: u32::read(stream),
                reject_data: ByteBuffer::read(stream),
            },
            6 => Self::M2cArrangedConnectionAccepted {
                request_id: u32::read(stream),
                possible_addresses: Vec::read(stream),
                connection_data: ByteBuffer::read(stream),
            },
            7 => Self::M2cArrangedConnectionRejected {
                request_id: u32::read(stream),
                reject_data: ByteBuffer::read(stream),
            },
            8 => Self::S2mUpdateServerStatus {
                level_name: StringTableEntry::read_with(stream, strings),
                level_type: StringTableEntry::read_with(stream, strings),
                bot_count: u32::read(stream),
                player_count: u32::read(stream),
                max_players: u32::read(stream),
                info_flags: u32::read(stream),
            },
            9 => Self::C2mRequestMotd,
            10 => Self::M2cSetMotd {
                master_name: String::read(stream),
                motd: String::read(stream),
            },
            11 => Self::C2mJoinGlobalChat,
            12 => Self::C2mLeaveGlobalChat,
            13 => Self::M2cPlayerJoinedGlobalChat {
                nick: StringTableEntry::read_with(stream, strings),
            },
            14 => Self::M2cPlayerLeftGlobalChat {
                nick: StringTableEntry::read_with(stream, strings),
            },
            15 => Self::M2cPlayersInGlobalChat {
                nicks: Vec::read_with(stream, strings),
            },
            16 => Self::C2mSendChat {
                message: String::read(stream),
            },
            17 => Self::M2cSendChat {
                nick: StringTableEntry::read_with(stream, strings),
                is_private: bool::read(stream),
                message: String::read(stream),
            },
            18 => Self::S2mChangeName {
                name: StringTableEntry::read_with(stream, strings),
            },
            19 => Self::S2mServerDescription {
                description: StringTableEntry::read_with(stream, strings),
            },
            20 => Self::M2cSendUpgradeStatus {
                needs_upgrade: bool::read(stream),
            },
            other => return Err(RpcError::UnknownMessage(other)),
        };

        stream.check()?;
        Ok(message)
    }
}
