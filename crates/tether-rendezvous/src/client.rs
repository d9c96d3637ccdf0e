//! The joining side of a rendezvous.
//!
//! ```text
//! Idle ──query_servers──→ QueryingServerList ──(empty batch)──→ Idle
//!   │
//!   └──request_connection──→ RequestingConnection ──request_sent──→ AwaitingBrokerResponse
//!                                                                     │
//!                                   ┌─────────────────┬───────────────┤
//!                                   ▼                 ▼               ▼
//!                               Accepted          Rejected        TimedOut
//!                                   │
//!                               connected()
//!                                   ▼
//!                               Connected
//! ```
//!
//! Every query and request takes a new id from one counter. Answers carry
//! the id back, and anything that does not match the current id is stale
//! and dropped without touching state.

use std::time::Instant;

use tether_rpc::{MasterInterface, MasterMessage};
use tether_strings::StringTableEntry;
use tether_wire::{ByteBuffer, IpAddress};

use crate::{ArrangedConnection, ClientConfig, RendezvousError};

/// Connection parameters a client attaches to every request.
pub const CONNECT_PARAMS: &[u8] = b"TTHR\0";

/// Where a [`RendezvousClient`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    QueryingServerList,
    RequestingConnection,
    AwaitingBrokerResponse,
    Accepted,
    Rejected,
    TimedOut,
    Connected,
}

/// Something the broker told the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The full server list for the current query.
    ServerList(Vec<IpAddress>),
    /// The host accepted; try these addresses with these keys.
    Accepted(ArrangedConnection),
    /// The host or the broker refused. Carries the reject data.
    Rejected(ByteBuffer),
    /// No answer within the client's own timeout.
    TimedOut,
    Motd { master_name: String, motd: String },
    /// Sent once on connect. `true` when a newer build is out.
    UpgradeStatus(bool),
    ChatMembers(Vec<String>),
    ChatJoined(String),
    ChatLeft(String),
    Chat { nick: String, is_private: bool, message: String },
}

/// A peer that asks the broker to introduce it to game hosts.
pub struct RendezvousClient {
    config: ClientConfig,
    /// A client that also hosts games refuses accepts meant for a client.
    hosting: bool,
    state: ClientState,
    query_id: u32,
    request_started: Option<Instant>,
    batches: Vec<IpAddress>,
    servers: Vec<IpAddress>,
    arranged: Option<ArrangedConnection>,
    outbox: Vec<MasterMessage>,
    events: Vec<ClientEvent>,
}

impl RendezvousClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            hosting: false,
            state: ClientState::Idle,
            query_id: 0,
            request_started: None,
            batches: Vec::new(),
            servers: Vec::new(),
            arranged: None,
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Marks this peer as a game host as well.
    pub fn set_hosting(&mut self, hosting: bool) {
        self.hosting = hosting;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Id of the query or request in flight.
    pub fn current_id(&self) -> u32 {
        self.query_id
    }

    /// The last complete server list.
    pub fn server_list(&self) -> &[IpAddress] {
        &self.servers
    }

    /// The accepted attempt, once there is one.
    pub fn arranged(&self) -> Option<&ArrangedConnection> {
        self.arranged.as_ref()
    }

    fn next_id(&mut self) -> u32 {
        self.query_id = self.query_id.wrapping_add(1);
        self.query_id
    }

    /// Starts a server list query.
    pub fn query_servers(&mut self) -> MasterMessage {
        let query_id = self.next_id();
        self.batches.clear();
        self.state = ClientState::QueryingServerList;
        tracing::debug!(query_id, "querying server list");
        MasterMessage::C2mQueryServers { query_id }
    }

    /// Starts a request to be introduced to the host at `remote`.
    pub fn request_connection(&mut self, remote: IpAddress, now: Instant) -> MasterMessage {
        let request_id = self.next_id();
        self.arranged = None;
        self.request_started = Some(now);
        self.state = ClientState::RequestingConnection;
        tracing::info!(request_id, %remote, "requesting arranged connection");
        MasterMessage::C2mRequestArrangedConnection {
            request_id,
            remote_address: remote,
            internal_address: self.config.local_address,
            params: ByteBuffer::new(CONNECT_PARAMS),
        }
    }

    /// The request went out; now waiting on the broker.
    pub fn request_sent(&mut self) {
        if self.state == ClientState::RequestingConnection {
            self.state = ClientState::AwaitingBrokerResponse;
        }
    }

    /// Gives up on a request the broker never answered.
    pub fn tick(&mut self, now: Instant) {
        let waiting = matches!(
            self.state,
            ClientState::RequestingConnection | ClientState::AwaitingBrokerResponse
        );
        let Some(started) = self.request_started.filter(|_| waiting) else {
            return;
        };
        if now.saturating_duration_since(started) >= self.config.request_timeout() {
            tracing::warn!(request_id = self.query_id, "arranged connection request timed out");
            self.state = ClientState::TimedOut;
            self.request_started = None;
            self.events.push(ClientEvent::TimedOut);
        }
    }

    /// The direct connection came up.
    ///
    /// # Errors
    /// [`RendezvousError::NotAccepted`] unless a request was accepted.
    pub fn connected(&mut self) -> Result<(), RendezvousError> {
        if self.state != ClientState::Accepted {
            return Err(RendezvousError::NotAccepted);
        }
        self.state = ClientState::Connected;
        Ok(())
    }

    /// Back to `Idle`, forgetting any request. Late answers become stale.
    pub fn reset(&mut self) {
        self.next_id();
        self.state = ClientState::Idle;
        self.request_started = None;
        self.arranged = None;
    }

    /// Calls to send, such as rejections of requests aimed at us.
    pub fn take_outbound(&mut self) -> Vec<MasterMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    fn is_current_request(&self, request_id: u32) -> bool {
        request_id == self.query_id
            && matches!(
                self.state,
                ClientState::RequestingConnection | ClientState::AwaitingBrokerResponse
            )
    }

    fn finish_request(&mut self, state: ClientState, event: ClientEvent) {
        self.state = state;
        self.request_started = None;
        self.events.push(event);
    }
}

impl MasterInterface for RendezvousClient {
    fn m2c_query_servers_response(&mut self, query_id: u32, servers: Vec<IpAddress>) {
        if query_id != self.query_id || self.state != ClientState::QueryingServerList {
            tracing::trace!(query_id, current = self.query_id, "stale server list dropped");
            return;
        }
        if !servers.is_empty() {
            self.batches.extend(servers);
            return;
        }
        self.servers = std::mem::take(&mut self.batches);
        self.state = ClientState::Idle;
        tracing::debug!(query_id, count = self.servers.len(), "server list complete");
        self.events.push(ClientEvent::ServerList(self.servers.clone()));
    }

    fn m2s_client_requested_arranged_connection(
        &mut self,
        request_id: u32,
        _possible_addresses: Vec<IpAddress>,
        params: ByteBuffer,
    ) {
        tracing::debug!(request_id, "not a host, rejecting arranged connection");
        self.outbox.push(MasterMessage::S2mRejectArrangedConnection {
            request_id,
            reject_data: params,
        });
    }

    fn m2c_arranged_connection_accepted(
        &mut self,
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        connection_data: ByteBuffer,
    ) {
        if self.hosting {
            tracing::debug!(request_id, error = %RendezvousError::NotAClient, "accept ignored");
            return;
        }
        if !self.is_current_request(request_id) {
            tracing::trace!(request_id, current = self.query_id, "stale accept dropped");
            return;
        }
        match ArrangedConnection::from_blob(possible_addresses, &connection_data) {
            Ok(attempt) => {
                tracing::info!(request_id, nonce = %attempt.nonce, "arranged connection accepted");
                self.arranged = Some(attempt.clone());
                self.finish_request(ClientState::Accepted, ClientEvent::Accepted(attempt));
            }
            Err(e) => {
                tracing::debug!(request_id, error = %e, "accept ignored");
            }
        }
    }

    fn m2c_arranged_connection_rejected(&mut self, request_id: u32, reject_data: ByteBuffer) {
        if !self.is_current_request(request_id) {
            tracing::trace!(request_id, current = self.query_id, "stale reject dropped");
            return;
        }
        tracing::info!(
            request_id,
            reason = %String::from_utf8_lossy(&reject_data),
            "arranged connection rejected"
        );
        self.finish_request(ClientState::Rejected, ClientEvent::Rejected(reject_data));
    }

    fn m2c_set_motd(&mut self, master_name: String, motd: String) {
        self.events.push(ClientEvent::Motd { master_name, motd });
    }

    fn m2c_send_upgrade_status(&mut self, needs_upgrade: bool) {
        if needs_upgrade {
            tracing::info!("broker reports a newer release");
        }
        self.events.push(ClientEvent::UpgradeStatus(needs_upgrade));
    }

    fn m2c_players_in_global_chat(&mut self, nicks: Vec<StringTableEntry>) {
        let nicks = nicks.iter().map(StringTableEntry::as_string).collect();
        self.events.push(ClientEvent::ChatMembers(nicks));
    }

    fn m2c_player_joined_global_chat(&mut self, nick: StringTableEntry) {
        self.events.push(ClientEvent::ChatJoined(nick.as_string()));
    }

    fn m2c_player_left_global_chat(&mut self, nick: StringTableEntry) {
        self.events.push(ClientEvent::ChatLeft(nick.as_string()));
    }

    fn m2c_send_chat(&mut self, nick: StringTableEntry, is_private: bool, message: String) {
        self.events.push(ClientEvent::Chat {
            nick: nick.as_string(),
            is_private,
            message,
        });
    }
}
