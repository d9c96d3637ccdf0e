//! The receiving side of an RPC: one method per call.
//!
//! Each role (broker, host, client) implements [`MasterInterface`] and
//! overrides only the calls it expects to receive. Everything else falls
//! through to a default that logs and does nothing, since a peer sending an
//! unexpected call is not a reason to drop the connection.

use tether_strings::StringTableEntry;
use tether_wire::{ByteBuffer, IpAddress};

use crate::MasterMessage;

fn unhandled(name: &'static str) {
    tracing::debug!(rpc = name, "ignoring unhandled call");
}

/// Receiver of decoded master calls. All calls are one-way.
#[allow(unused_variables)]
pub trait MasterInterface {
    fn c2m_query_servers(&mut self, query_id: u32) {
        unhandled("c2m_query_servers");
    }

    fn m2c_query_servers_response(&mut self, query_id: u32, servers: Vec<IpAddress>) {
        unhandled("m2c_query_servers_response");
    }

    fn c2m_request_arranged_connection(
        &mut self,
        request_id: u32,
        remote_address: IpAddress,
        internal_address: IpAddress,
        params: ByteBuffer,
    ) {
        unhandled("c2m_request_arranged_connection");
    }

    fn m2s_client_requested_arranged_connection(
        &mut self,
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        params: ByteBuffer,
    ) {
        unhandled("m2s_client_requested_arranged_connection");
    }

    fn s2m_accept_arranged_connection(
        &mut self,
        request_id: u32,
        internal_address: IpAddress,
        connection_data: ByteBuffer,
    ) {
        unhandled("s2m_accept_arranged_connection");
    }

    fn s2m_reject_arranged_connection(&mut self, request_id: u32, reject_data: ByteBuffer) {
        unhandled("s2m_reject_arranged_connection");
    }

    fn m2c_arranged_connection_accepted(
        &mut self,
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        connection_data: ByteBuffer,
    ) {
        unhandled("m2c_arranged_connection_accepted");
    }

    fn m2c_arranged_connection_rejected(&mut self, request_id: u32, reject_data: ByteBuffer) {
        unhandled("m2c_arranged_connection_rejected");
    }

    fn s2m_update_server_status(
        &mut self,
        level_name: StringTableEntry,
        level_type: StringTableEntry,
        bot_count: u32,
        player_count: u32,
        max_players: u32,
        info_flags: u32,
    ) {
        unhandled("s2m_update_server_status");
    }

    fn c2m_request_motd(&mut self) {
        unhandled("c2m_request_motd");
    }

    fn m2c_set_motd(&mut self, master_name: String, motd: String) {
        unhandled("m2c_set_motd");
    }

    fn c2m_join_global_chat(&mut self) {
        unhandled("c2m_join_global_chat");
    }

    fn c2m_leave_global_chat(&mut self) {
        unhandled("c2m_leave_global_chat");
    }

    fn m2c_player_joined_global_chat(&mut self, nick: StringTableEntry) {
        unhandled("m2c_player_joined_global_chat");
    }

    fn m2c_player_left_global_chat(&mut self, nick: StringTableEntry) {
        unhandled("m2c_player_left_global_chat");
    }

    fn m2c_players_in_global_chat(&mut self, nicks: Vec<StringTableEntry>) {
        unhandled("m2c_players_in_global_chat");
    }

    fn c2m_send_chat(&mut self, message: String) {
        unhandled("c2m_send_chat");
    }

    fn m2c_send_chat(&mut self, nick: StringTableEntry, is_private: bool, message: String) {
        unhandled("m2c_send_chat");
    }

    fn s2m_change_name(&mut self, name: StringTableEntry) {
        unhandled("s2m_change_name");
    }

    fn s2m_server_description(&mut self, description: StringTableEntry) {
        unhandled("s2m_server_description");
    }

    fn m2c_send_upgrade_status(&mut self, needs_upgrade: bool) {
        unhandled("m2c_send_upgrade_status");
    }
}

impl MasterMessage {
    /// Invokes the matching method on `target`, arguments in order.
    pub fn dispatch<T: MasterInterface + ?Sized>(self, target: &mut T) {
        match self {
            Self::C2mQueryServers { query_id } => target.c2m_query_servers(query_id),
            Self::M2cQueryServersResponse { query_id, servers } => {
                target.m2c_query_servers_response(query_id, servers)
            }
            Self::C2mRequestArrangedConnection {
                request_id,
                remote_address,
                internal_address,
                params,
            } => target.c2m_request_arranged_connection(
                request_id,
                remote_address,
                internal_address,
                params,
            ),
            Self::M2sClientRequestedArrangedConnection {
                request_id,
                possible_addresses,
                params,
            } => target.m2s_client_requested_arranged_connection(
                request_id,
                possible_addresses,
                params,
            ),
            Self::S2mAcceptArrangedConnection {
                request_id,
                internal_address,
                connection_data,
            } => target.s2m_accept_arranged_connection(
                request_id,
                internal_address,
                connection_data,
            ),
            Self::S2mRejectArrangedConnection {
                request_id,
                reject_data,
            } => target.s2m_reject_arranged_connection(request_id, reject_data),
            Self::M2cArrangedConnectionAccepted {
                request_id,
                possible_addresses,
                connection_data,
            } => target.m2c_arranged_connection_accepted(
                request_id,
                possible_addresses,
                connection_data,
            ),
            Self::M2cArrangedConnectionRejected {
                request_id,
                reject_data,
            } => target.m2c_arranged_connection_rejected(request_id, reject_data),
            Self::S2mUpdateServerStatus {
                level_name,
                level_type,
                bot_count,
                player_count,
                max_players,
                info_flags,
            } => target.s2m_update_server_status(
                level_name,
                level_type,
                bot_count,
                player_count,
                max_players,
                info_flags,
            ),
            Self::C2mRequestMotd => target.c2m_request_motd(),
            Self::M2cSetMotd { master_name, motd } => target.m2c_set_motd(master_name, motd),
            Self::C2mJoinGlobalChat => target.c2m_join_global_chat(),
            Self::C2mLeaveGlobalChat => target.c2m_leave_global_chat(),
            Self::M2cPlayerJoinedGlobalChat { nick } => {
                target.m2c_player_joined_global_chat(nick)
            }
            Self::M2cPlayerLeftGlobalChat { nick } => target.m2c_player_left_global_chat(nick),
            Self::M2cPlayersInGlobalChat { nicks } => target.m2c_players_in_global_chat(nicks),
            Self::C2mSendChat { message } => target.c2m_send_chat(message),
            Self::M2cSendChat {
                nick,
                is_private,
                message,
            } => target.m2c_send_chat(nick, is_private, message),
            Self::S2mChangeName { name } => target.s2m_change_name(name),
            Self::S2mServerDescription { description } => {
                target.s2m_server_description(description)
            }
            Self::M2cSendUpgradeStatus { needs_upgrade } => {
                target.m2c_send_upgrade_status(needs_upgrade)
            }
        }
    }
}
