//! The game-host side of a rendezvous.
//!
//! A host answers `m2s_client_requested_arranged_connection`. It either
//! refuses, echoing the request id and params back, or accepts with a
//! fresh nonce pair and secret and starts expecting the client directly.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use tether_rpc::{MasterInterface, MasterMessage};
use tether_wire::{ByteBuffer, IpAddress};

use crate::{ArrangedConnection, HostConfig};

/// Banned initiator IPs. Ports are not part of a ban.
#[derive(Debug, Clone, Default)]
pub struct BanList {
    ips: HashSet<Ipv4Addr>,
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban(&mut self, ip: Ipv4Addr) -> bool {
        self.ips.insert(ip)
    }

    pub fn unban(&mut self, ip: Ipv4Addr) -> bool {
        self.ips.remove(&ip)
    }

    pub fn is_banned(&self, address: &IpAddress) -> bool {
        self.ips.contains(&address.ip())
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }
}

impl FromIterator<Ipv4Addr> for BanList {
    fn from_iter<I: IntoIterator<Item = Ipv4Addr>>(iter: I) -> Self {
        Self {
            ips: iter.into_iter().collect(),
        }
    }
}

/// A peer that hosts games and accepts arranged connections.
pub struct RendezvousHost {
    accepting: bool,
    local_address: IpAddress,
    bans: BanList,
    outbox: Vec<MasterMessage>,
    pending: Vec<ArrangedConnection>,
}

impl RendezvousHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            accepting: config.accepting,
            local_address: config.local_address,
            bans: config.banned.into_iter().collect(),
            outbox: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn bans(&self) -> &BanList {
        &self.bans
    }

    pub fn bans_mut(&mut self) -> &mut BanList {
        &mut self.bans
    }

    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Decides on one brokered request and returns the answer to send.
    ///
    /// On accept the new attempt is also queued; see
    /// [`take_pending`](Self::take_pending).
    pub fn answer(
        &mut self,
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        params: ByteBuffer,
    ) -> MasterMessage {
        if !self.accepting {
            tracing::debug!(request_id, "not accepting, rejecting arranged connection");
            return MasterMessage::S2mRejectArrangedConnection {
                request_id,
                reject_data: params,
            };
        }
        if let Some(first) = possible_addresses.first().filter(|a| self.bans.is_banned(a)) {
            tracing::info!(request_id, address = %first, "banned initiator rejected");
            return MasterMessage::S2mRejectArrangedConnection {
                request_id,
                reject_data: params,
            };
        }

        let attempt = ArrangedConnection::generate(possible_addresses);
        let connection_data = attempt.to_blob();
        tracing::info!(request_id, nonce = %attempt.nonce, "accepting arranged connection");
        self.pending.push(attempt);
        MasterMessage::S2mAcceptArrangedConnection {
            request_id,
            internal_address: self.local_address,
            connection_data,
        }
    }

    /// Calls produced by dispatched requests, in order.
    pub fn take_outbound(&mut self) -> Vec<MasterMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Accepted attempts waiting for the client to show up.
    pub fn take_pending(&mut self) -> Vec<ArrangedConnection> {
        std::mem::take(&mut self.pending)
    }
}

impl MasterInterface for RendezvousHost {
    fn m2s_client_requested_arranged_connection(
        &mut self,
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        params: ByteBuffer,
    ) {
        let reply = self.answer(request_id, possible_addresses, params);
        self.outbox.push(reply);
    }
}
