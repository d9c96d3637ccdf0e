//! The rendezvous broker.
//!
//! The broker knows every connected peer, lists game hosts to clients, and
//! introduces a client to a host so the two can try a direct connection.
//! It never sees game traffic.
//!
//! ```text
//! client                      broker                         host
//!   c2m_request_arranged ──→  open request (host id H)
//!                             m2s_client_requested(H) ──→
//!                                                      ←── s2m_accept(H, blob)
//!                     ←── m2c_accepted(client id, blob)
//! ```
//!
//! # Driving it
//!
//! `Broker` does no I/O. The server feeds it:
//! - [`register`](Broker::register) when a handshake succeeds,
//! - [`handle`](Broker::handle) for every decoded call,
//! - [`tick`](Broker::tick) periodically,
//! - [`unregister`](Broker::unregister) when a connection ends,
//!
//! and delivers the [`Outbound`] calls each of those returns.
//!
//! # Teardown
//!
//! Unregistering a peer only tells the global chat. Requests that name the
//! peer stay put: its [`PeerKey`] no longer resolves, so a reply to a dead
//! initiator is consumed without forwarding, and a request to a dead host
//! expires with "Timed Out" like any unanswered one.

use std::time::Instant;

use tether_rpc::{ConnectRequest, MasterInterface, MasterMessage, PeerRole, RpcError, ServerInfo};
use tether_strings::{StringTable, StringTableEntry};
use tether_wire::{ByteBuffer, IpAddress};

use crate::peer::{PeerArena, PeerKind, PeerRecord, ServerRecord};
use crate::{BrokerConfig, PeerKey, RendezvousError, RequestTracker};

/// Reject reason when no registered host has the requested address.
/// Both reject reasons go out NUL-terminated.
pub const NO_SUCH_HOST: &[u8] = b"No Such Host\0";

/// Reject reason when the host never answered.
pub const TIMED_OUT: &[u8] = b"Timed Out\0";

/// A call the broker wants delivered to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: PeerKey,
    pub message: MasterMessage,
}

/// Where to look for a peer seen at `observed` that reports `internal`.
///
/// Most likely first: the observed address with the next port, the
/// observed address itself, and the internal address when it adds
/// something.
pub fn candidate_addresses(observed: IpAddress, internal: IpAddress) -> Vec<IpAddress> {
    let mut candidates = vec![
        observed.with_port(observed.port.wrapping_add(1)),
        observed,
    ];
    if !internal.is_any() && internal != observed {
        candidates.push(internal);
    }
    candidates
}

/// Rendezvous broker state. See the module docs.
pub struct Broker {
    config: BrokerConfig,
    strings: StringTable,
    peers: PeerArena,
    requests: RequestTracker,
}

impl Broker {
    pub fn new(config: BrokerConfig, strings: StringTable) -> Self {
        Self {
            config,
            strings,
            peers: PeerArena::default(),
            requests: RequestTracker::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Admits a peer that completed its handshake.
    ///
    /// Clients are greeted with `m2c_send_upgrade_status`; the returned
    /// calls are that greeting and must be delivered after the peer's
    /// route exists.
    ///
    /// # Errors
    /// [`RpcError::VersionMismatch`] if the master protocol version is
    /// outside the configured range. Nothing is registered then.
    pub fn register(
        &mut self,
        address: IpAddress,
        request: &ConnectRequest,
    ) -> Result<(PeerKey, Vec<Outbound>), RpcError> {
        if let Err(e) =
            request.check_version(self.config.min_master_version, self.config.max_master_version)
        {
            tracing::warn!(%address, error = %e, "refusing peer");
            return Err(e);
        }

        let (name, kind) = match &request.role {
            PeerRole::Client { player_name } => {
                (self.strings.insert(player_name, false), PeerKind::Client)
            }
            PeerRole::Server(info) => (
                self.strings.insert(&info.name, true),
                PeerKind::Server(ServerRecord {
                    description: self.strings.insert(&info.description, true),
                    level_name: self.strings.insert(&info.level_name, true),
                    level_type: self.strings.insert(&info.level_type, true),
                    bot_count: info.bot_count,
                    player_count: info.player_count,
                    max_players: info.max_players,
                    info_flags: info.info_flags,
                    hidden: false,
                }),
            ),
        };
        let is_server = matches!(kind, PeerKind::Server(_));
        let key = self.peers.insert(PeerRecord {
            address,
            cs_version: request.cs_protocol_version,
            build: request.build,
            name,
            kind,
            in_global_chat: false,
        });
        tracing::info!(%key, %address, is_server, name = request.role.display_name(), "peer registered");

        let mut greeting = Vec::new();
        if !is_server {
            let needs_upgrade = self.config.latest_cs_version > request.cs_protocol_version
                || self.config.latest_build > request.build;
            if needs_upgrade {
                tracing::debug!(%key, build = request.build, "client is out of date");
            }
            greeting.push(Outbound {
                to: key,
                message: MasterMessage::M2cSendUpgradeStatus { needs_upgrade },
            });
        }
        Ok((key, greeting))
    }

    /// Forgets a peer. Returns the chat notifications its departure causes.
    pub fn unregister(&mut self, key: PeerKey) -> Vec<Outbound> {
        let Some(peer) = self.peers.remove(key) else {
            return Vec::new();
        };
        tracing::info!(
            %key,
            address = %peer.address,
            pending = self.requests.pending_for(key),
            "peer unregistered"
        );
        if peer.in_global_chat {
            self.notify_chat(key, MasterMessage::M2cPlayerLeftGlobalChat { nick: peer.name })
        } else {
            Vec::new()
        }
    }

    /// Processes one call from `from`.
    pub fn handle(&mut self, from: PeerKey, message: MasterMessage, now: Instant) -> Vec<Outbound> {
        if !self.peers.contains(from) {
            tracing::debug!(%from, rpc = message.name(), "call from unknown peer dropped");
            return Vec::new();
        }
        let mut call = BrokerCall {
            broker: self,
            from,
            now,
            out: Vec::new(),
        };
        message.dispatch(&mut call);
        call.out
    }

    /// Expires requests the host never answered.
    pub fn tick(&mut self, now: Instant) -> Vec<Outbound> {
        let timeout = self.config.request_timeout();
        self.requests
            .expire(now, timeout)
            .into_iter()
            .filter_map(|req| {
                tracing::warn!(
                    initiator = %req.initiator,
                    host = %req.host,
                    host_query_id = req.host_query_id,
                    "arranged connection request timed out"
                );
                self.peers.contains(req.initiator).then(|| Outbound {
                    to: req.initiator,
                    message: MasterMessage::M2cArrangedConnectionRejected {
                        request_id: req.initiator_query_id,
                        reject_data: ByteBuffer::new(TIMED_OUT),
                    },
                })
            })
            .collect()
    }

    /// Hides a server from (or shows it in) query results.
    ///
    /// # Errors
    /// [`RendezvousError::UnknownPeer`] if `key` is not a live server.
    pub fn set_hidden(&mut self, key: PeerKey, hidden: bool) -> Result<(), RendezvousError> {
        let server = self
            .peers
            .get_mut(key)
            .and_then(PeerRecord::server_mut)
            .ok_or(RendezvousError::UnknownPeer(key))?;
        server.hidden = hidden;
        Ok(())
    }

    /// What a live server last reported.
    pub fn server_info(&self, key: PeerKey) -> Option<ServerInfo> {
        self.peers.get(key).and_then(PeerRecord::server_info)
    }

    /// Address the broker observed for a live peer.
    pub fn peer_address(&self, key: PeerKey) -> Option<IpAddress> {
        self.peers.get(key).map(|p| p.address)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Sends `message` to every chat member except `except`.
    fn notify_chat(&self, except: PeerKey, message: MasterMessage) -> Vec<Outbound> {
        self.peers
            .iter()
            .filter(|(key, peer)| *key != except && peer.in_global_chat)
            .map(|(to, _)| Outbound {
                to,
                message: message.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Call handling
// ---------------------------------------------------------------------------

/// One call in flight: the broker, who sent it, and what to send back.
struct BrokerCall<'a> {
    broker: &'a mut Broker,
    from: PeerKey,
    now: Instant,
    out: Vec<Outbound>,
}

impl BrokerCall<'_> {
    fn sender(&self) -> Option<&PeerRecord> {
        self.broker.peers.get(self.from)
    }

    fn reply(&mut self, message: MasterMessage) {
        self.out.push(Outbound {
            to: self.from,
            message,
        });
    }

    fn send(&mut self, to: PeerKey, message: MasterMessage) {
        self.out.push(Outbound { to, message });
    }

    /// Server-only calls are ignored from clients.
    fn server_mut(&mut self, rpc: &'static str) -> Option<&mut PeerRecord> {
        let from = self.from;
        match self.broker.peers.get_mut(from) {
            Some(peer) if peer.is_server() => Some(peer),
            _ => {
                tracing::debug!(%from, rpc, "server-only call from client ignored");
                None
            }
        }
    }
}

impl MasterInterface for BrokerCall<'_> {
    fn c2m_query_servers(&mut self, query_id: u32) {
        let Some(cs_version) = self.sender().map(|p| p.cs_version) else {
            return;
        };
        let servers: Vec<IpAddress> = self
            .broker
            .peers
            .iter()
            .filter(|(key, peer)| {
                *key != self.from
                    && peer.cs_version == cs_version
                    && peer.server().is_some_and(|s| !s.hidden)
            })
            .map(|(_, peer)| peer.address)
            .collect();

        tracing::debug!(from = %self.from, query_id, count = servers.len(), "server list query");
        let batch_size = self.broker.config.query_batch_size.max(1);
        for batch in servers.chunks(batch_size) {
            self.reply(MasterMessage::M2cQueryServersResponse {
                query_id,
                servers: batch.to_vec(),
            });
        }
        self.reply(MasterMessage::M2cQueryServersResponse {
            query_id,
            servers: Vec::new(),
        });
    }

    fn c2m_request_arranged_connection(
        &mut self,
        request_id: u32,
        remote_address: IpAddress,
        internal_address: IpAddress,
        params: ByteBuffer,
    ) {
        let Some(observed) = self.sender().map(|p| p.address) else {
            return;
        };
        let host = self
            .broker
            .peers
            .iter()
            .find(|(_, peer)| peer.is_server() && peer.address == remote_address)
            .map(|(key, _)| key);

        let Some(host) = host else {
            tracing::debug!(from = %self.from, %remote_address, "no such host");
            self.reply(MasterMessage::M2cArrangedConnectionRejected {
                request_id,
                reject_data: ByteBuffer::new(NO_SUCH_HOST),
            });
            return;
        };

        let host_query_id = self.broker.requests.open(self.from, host, request_id, self.now);
        tracing::info!(
            initiator = %self.from,
            %host,
            request_id,
            host_query_id,
            "forwarding arranged connection request"
        );
        self.send(
            host,
            MasterMessage::M2sClientRequestedArrangedConnection {
                request_id: host_query_id,
                possible_addresses: candidate_addresses(observed, internal_address),
                params,
            },
        );
    }

    fn s2m_accept_arranged_connection(
        &mut self,
        request_id: u32,
        internal_address: IpAddress,
        connection_data: ByteBuffer,
    ) {
        let Some(observed) = self.sender().map(|p| p.address) else {
            return;
        };
        let Some(req) = self.broker.requests.take(request_id, self.from) else {
            tracing::debug!(host = %self.from, request_id, "accept for unknown request ignored");
            return;
        };
        if !self.broker.peers.contains(req.initiator) {
            tracing::debug!(initiator = %req.initiator, "initiator gone, accept dropped");
            return;
        }
        tracing::info!(host = %self.from, initiator = %req.initiator, "arranged connection accepted");
        self.send(
            req.initiator,
            MasterMessage::M2cArrangedConnectionAccepted {
                request_id: req.initiator_query_id,
                possible_addresses: candidate_addresses(observed, internal_address),
                connection_data,
            },
        );
    }

    fn s2m_reject_arranged_connection(&mut self, request_id: u32, reject_data: ByteBuffer) {
        let Some(req) = self.broker.requests.take(request_id, self.from) else {
            tracing::debug!(host = %self.from, request_id, "reject for unknown request ignored");
            return;
        };
        if !self.broker.peers.contains(req.initiator) {
            tracing::debug!(initiator = %req.initiator, "initiator gone, reject dropped");
            return;
        }
        tracing::info!(host = %self.from, initiator = %req.initiator, "arranged connection rejected");
        self.send(
            req.initiator,
            MasterMessage::M2cArrangedConnectionRejected {
                request_id: req.initiator_query_id,
                reject_data,
            },
        );
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
        let from = self.from;
        let Some(server) = self
            .server_mut("s2m_update_server_status")
            .and_then(PeerRecord::server_mut)
        else {
            return;
        };
        let changed = server.level_name != level_name
            || server.level_type != level_type
            || server.bot_count != bot_count
            || server.player_count != player_count
            || server.max_players != max_players
            || server.info_flags != info_flags;
        if !changed {
            return;
        }
        server.level_name = level_name;
        server.level_type = level_type;
        server.bot_count = bot_count;
        server.player_count = player_count;
        server.max_players = max_players;
        server.info_flags = info_flags;
        tracing::debug!(%from, player_count, max_players, "server status updated");
    }

    fn c2m_request_motd(&mut self) {
        let config = &self.broker.config;
        let motd = self
            .sender()
            .and_then(|peer| config.build_motd.get(&peer.build))
            .unwrap_or(&config.motd);
        let message = MasterMessage::M2cSetMotd {
            master_name: config.master_name.clone(),
            motd: motd.clone(),
        };
        self.reply(message);
    }

    fn c2m_join_global_chat(&mut self) {
        let from = self.from;
        let nick = match self.broker.peers.get_mut(from) {
            Some(peer) if !peer.is_server() && !peer.in_global_chat => {
                peer.in_global_chat = true;
                peer.name.clone()
            }
            _ => return,
        };
        tracing::debug!(%from, %nick, "joined global chat");

        let mut members = Vec::new();
        for (key, peer) in self.broker.peers.iter() {
            if key != from && peer.in_global_chat {
                members.push(peer.name.clone());
                self.out.push(Outbound {
                    to: key,
                    message: MasterMessage::M2cPlayerJoinedGlobalChat { nick: nick.clone() },
                });
            }
        }
        self.reply(MasterMessage::M2cPlayersInGlobalChat { nicks: members });
    }

    fn c2m_leave_global_chat(&mut self) {
        let from = self.from;
        let nick = match self.broker.peers.get_mut(from) {
            Some(peer) if peer.in_global_chat => {
                peer.in_global_chat = false;
                peer.name.clone()
            }
            _ => return,
        };
        tracing::debug!(%from, %nick, "left global chat");
        let notices = self
            .broker
            .notify_chat(from, MasterMessage::M2cPlayerLeftGlobalChat { nick });
        self.out.extend(notices);
    }

    fn c2m_send_chat(&mut self, message: String) {
        let from = self.from;
        let nick = match self.sender() {
            Some(peer) if !peer.is_server() => peer.name.clone(),
            _ => return,
        };

        match parse_private(&message) {
            Some(Ok((to_nick, body))) => {
                let recipients: Vec<PeerKey> = self
                    .broker
                    .peers
                    .iter()
                    .filter(|(_, peer)| {
                        !peer.is_server() && peer.name.as_string().eq_ignore_ascii_case(to_nick)
                    })
                    .map(|(key, _)| key)
                    .collect();
                tracing::debug!(%from, to = to_nick, delivered = recipients.len(), "private chat");
                for to in recipients {
                    self.send(
                        to,
                        MasterMessage::M2cSendChat {
                            nick: nick.clone(),
                            is_private: true,
                            message: body.to_owned(),
                        },
                    );
                }
            }
            Some(Err(())) => {
                tracing::debug!(%from, "malformed private message dropped");
            }
            None => {
                let relay = self.broker.notify_chat(
                    from,
                    MasterMessage::M2cSendChat {
                        nick,
                        is_private: false,
                        message,
                    },
                );
                self.out.extend(relay);
            }
        }
    }

    fn s2m_change_name(&mut self, name: StringTableEntry) {
        if let Some(peer) = self.server_mut("s2m_change_name") {
            tracing::info!(from = %peer.address, old = %peer.name, new = %name, "server renamed");
            peer.name = name;
        }
    }

    fn s2m_server_description(&mut self, description: StringTableEntry) {
        if let Some(server) = self
            .server_mut("s2m_server_description")
            .and_then(PeerRecord::server_mut)
        {
            server.description = description;
        }
    }
}

/// Splits `/nick body`. `None` for a public message, `Err` when there is no
/// body.
fn parse_private(message: &str) -> Option<Result<(&str, &str), ()>> {
    let rest = message.strip_prefix('/')?;
    Some(rest.split_once([' ', '\t']).ok_or(()))
}
