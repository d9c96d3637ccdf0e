//! Integration tests for the rendezvous state machines.
//!
//! A broker, a host, and a client are wired together in memory: whatever
//! one side returns is dispatched straight into the peer it is addressed
//! to. No sockets, no clocks; time is passed in explicitly.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tether_rendezvous::{
    BLOB_SIZE, Broker, BrokerConfig, CONNECT_PARAMS, ClientConfig, ClientEvent, ClientState,
    HostConfig, NO_SUCH_HOST, Outbound, PeerKey, RendezvousClient, RendezvousHost, TIMED_OUT,
    candidate_addresses,
};
use tether_rpc::{
    ConnectRequest, MasterMessage, RpcError, ServerInfo, decode_packet, encode_packet,
};
use tether_strings::{ConnectionStringTable, StringTable};
use tether_wire::{ByteBuffer, IpAddress};

// =========================================================================
// Harness
// =========================================================================

fn addr(s: &str) -> IpAddress {
    s.parse().unwrap()
}

fn server_info(name: &str) -> ServerInfo {
    ServerInfo {
        max_players: 16,
        level_name: "Dust".into(),
        level_type: "CTF".into(),
        name: name.into(),
        description: "test host".into(),
        ..ServerInfo::default()
    }
}

struct World {
    strings: StringTable,
    broker: Broker,
    host_key: PeerKey,
    client_key: PeerKey,
    host_addr: IpAddress,
    client_addr: IpAddress,
    host: RendezvousHost,
    client: RendezvousClient,
}

impl World {
    fn new(host_config: HostConfig) -> Self {
        let strings = StringTable::new();
        let mut broker = Broker::new(BrokerConfig::default(), strings.clone());
        let host_addr = addr("203.0.113.10:28000");
        let client_addr = addr("198.51.100.20:50000");
        let host_key = broker
            .register(host_addr, &ConnectRequest::server(server_info("Frontier")))
            .unwrap()
            .0;
        let client_key = broker
            .register(client_addr, &ConnectRequest::client("Nova"))
            .unwrap()
            .0;
        Self {
            strings,
            broker,
            host_key,
            client_key,
            host_addr,
            client_addr,
            host: RendezvousHost::new(HostConfig {
                local_address: addr("192.168.1.10:28000"),
                ..host_config
            }),
            client: RendezvousClient::new(ClientConfig {
                local_address: addr("10.0.0.20:50000"),
                ..ClientConfig::default()
            }),
        }
    }

    /// Delivers broker output to host and client.
    fn deliver(&mut self, out: Vec<Outbound>) {
        for o in out {
            if o.to == self.host_key {
                o.message.dispatch(&mut self.host);
            } else if o.to == self.client_key {
                o.message.dispatch(&mut self.client);
            } else {
                panic!("message for unexpected peer {}", o.to);
            }
        }
    }

    /// Sends every queued host reply through the broker.
    fn flush_host(&mut self, now: Instant) {
        for reply in self.host.take_outbound() {
            let out = self.broker.handle(self.host_key, reply, now);
            self.deliver(out);
        }
    }

    fn request(&mut self, now: Instant) {
        let req = self.client.request_connection(self.host_addr, now);
        self.client.request_sent();
        let out = self.broker.handle(self.client_key, req, now);
        self.deliver(out);
    }
}

fn texts(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Rejected(data) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Happy path
// =========================================================================

#[test]
fn test_rendezvous_query_then_accept_shares_keys() {
    let mut w = World::new(HostConfig::default());
    let now = Instant::now();

    let query = w.client.query_servers();
    let out = w.broker.handle(w.client_key, query, now);
    assert_eq!(
        out.iter().map(|o| o.message.clone()).collect::<Vec<_>>(),
        vec![
            MasterMessage::M2cQueryServersResponse {
                query_id: 1,
                servers: vec![w.host_addr],
            },
            MasterMessage::M2cQueryServersResponse {
                query_id: 1,
                servers: vec![],
            },
        ]
    );
    w.deliver(out);
    assert_eq!(w.client.server_list(), &[w.host_addr]);

    w.request(now);
    assert_eq!(w.broker.pending_requests(), 1);
    w.flush_host(now);
    assert_eq!(w.broker.pending_requests(), 0);

    assert_eq!(w.client.state(), ClientState::Accepted);
    let client_side = w.client.arranged().unwrap().clone();
    let host_side = w.host.take_pending().remove(0);

    assert_eq!(client_side.key(), host_side.key());
    assert_eq!(client_side.shared_secret, host_side.shared_secret);
    assert_eq!(client_side.to_blob().len(), BLOB_SIZE);
    assert!(client_side.is_initiator);
    assert!(!host_side.is_initiator);

    // Each side tries the other's observed address first.
    assert_eq!(
        client_side.possible_addresses,
        candidate_addresses(w.host_addr, addr("192.168.1.10:28000"))
    );
    assert_eq!(
        host_side.possible_addresses,
        candidate_addresses(w.client_addr, addr("10.0.0.20:50000"))
    );

    w.client.connected().unwrap();
    assert_eq!(w.client.state(), ClientState::Connected);
}

#[test]
fn test_forwarded_request_carries_params_and_broker_id() {
    let mut w = World::new(HostConfig::default());
    let now = Instant::now();
    let req = w.client.request_connection(w.host_addr, now);
    let out = w.broker.handle(w.client_key, req, now);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, w.host_key);
    let MasterMessage::M2sClientRequestedArrangedConnection {
        possible_addresses,
        params,
        ..
    } = &out[0].message
    else {
        panic!("expected forward, got {:?}", out[0].message);
    };
    assert_eq!(&**params, CONNECT_PARAMS);
    assert_eq!(possible_addresses[0], w.client_addr.with_port(50001));
    assert_eq!(w.broker.pending_requests(), 1);
}

// =========================================================================
// Refusals
// =========================================================================

#[test]
fn test_banned_initiator_is_rejected_with_original_id() {
    let mut w = World::new(HostConfig {
        banned: vec![Ipv4Addr::new(198, 51, 100, 20)],
        ..HostConfig::default()
    });
    let now = Instant::now();
    w.client.query_servers();
    w.request(now);
    w.flush_host(now);

    assert!(w.host.take_pending().is_empty());
    assert_eq!(w.client.state(), ClientState::Rejected);
    assert_eq!(w.client.current_id(), 2);
    assert_eq!(
        w.client.take_events(),
        vec![ClientEvent::Rejected(ByteBuffer::new(CONNECT_PARAMS))]
    );
}

#[test]
fn test_unknown_host_is_rejected_by_broker() {
    let mut w = World::new(HostConfig::default());
    let req = w
        .client
        .request_connection(addr("203.0.113.99:28000"), Instant::now());
    let out = w.broker.handle(w.client_key, req, Instant::now());
    w.deliver(out);
    assert_eq!(w.client.state(), ClientState::Rejected);
    assert_eq!(texts(&w.client.take_events()), vec!["No Such Host\0".to_string()]);
}

#[test]
fn test_request_to_client_address_is_no_such_host() {
    let mut w = World::new(HostConfig::default());
    let target = w.client_addr;
    let req = w.client.request_connection(target, Instant::now());
    let out = w.broker.handle(w.client_key, req, Instant::now());
    w.deliver(out);
    assert_eq!(
        w.client.take_events(),
        vec![ClientEvent::Rejected(ByteBuffer::new(NO_SUCH_HOST))]
    );
}

// =========================================================================
// Stale responses
// =========================================================================

#[test]
fn test_stale_server_list_is_dropped() {
    let mut w = World::new(HostConfig::default());
    w.client.query_servers();
    w.client.query_servers();

    MasterMessage::M2cQueryServersResponse {
        query_id: 1,
        servers: vec![w.host_addr],
    }
    .dispatch(&mut w.client);
    MasterMessage::M2cQueryServersResponse {
        query_id: 1,
        servers: vec![],
    }
    .dispatch(&mut w.client);

    assert_eq!(w.client.state(), ClientState::QueryingServerList);
    assert!(w.client.server_list().is_empty());
    assert!(w.client.take_events().is_empty());

    MasterMessage::M2cQueryServersResponse {
        query_id: 2,
        servers: vec![],
    }
    .dispatch(&mut w.client);
    assert_eq!(w.client.state(), ClientState::Idle);
}

#[test]
fn test_accept_for_superseded_request_is_dropped() {
    let mut w = World::new(HostConfig::default());
    let now = Instant::now();
    w.request(now);
    let first_answer = w.host.take_outbound();

    // A second request supersedes the first before the host answers.
    w.request(now);
    for reply in first_answer {
        let out = w.broker.handle(w.host_key, reply, now);
        w.deliver(out);
    }
    assert_eq!(w.client.state(), ClientState::AwaitingBrokerResponse);
    assert!(w.client.arranged().is_none());

    w.flush_host(now);
    assert_eq!(w.client.state(), ClientState::Accepted);
}

// =========================================================================
// Timeouts and teardown
// =========================================================================

#[test]
fn test_unanswered_request_times_out_after_five_seconds() {
    let mut w = World::new(HostConfig::default());
    let start = Instant::now();
    w.request(start);
    drop(w.host.take_outbound());

    assert!(w.broker.tick(start + Duration::from_millis(4999)).is_empty());
    let out = w.broker.tick(start + Duration::from_millis(5000));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, w.client_key);
    w.deliver(out);

    assert_eq!(w.broker.pending_requests(), 0);
    assert_eq!(w.client.state(), ClientState::Rejected);
    assert_eq!(texts(&w.client.take_events()), vec!["Timed Out\0".to_string()]);
}

#[test]
fn test_host_disconnect_leaves_request_to_time_out() {
    let mut w = World::new(HostConfig::default());
    let start = Instant::now();
    w.request(start);
    assert!(w.broker.unregister(w.host_key).is_empty());
    assert_eq!(w.broker.pending_requests(), 1);

    let out = w.broker.tick(start + Duration::from_secs(5));
    w.deliver(out);
    assert_eq!(
        w.client.take_events(),
        vec![ClientEvent::Rejected(ByteBuffer::new(TIMED_OUT))]
    );
}

#[test]
fn test_accept_after_initiator_left_is_consumed() {
    let mut w = World::new(HostConfig::default());
    let now = Instant::now();
    w.request(now);
    w.broker.unregister(w.client_key);

    for reply in w.host.take_outbound() {
        assert!(w.broker.handle(w.host_key, reply, now).is_empty());
    }
    assert_eq!(w.broker.pending_requests(), 0);
}

#[test]
fn test_timeout_for_dead_initiator_sends_nothing() {
    let mut w = World::new(HostConfig::default());
    let start = Instant::now();
    w.request(start);
    w.broker.unregister(w.client_key);
    assert!(w.broker.tick(start + Duration::from_secs(6)).is_empty());
    assert_eq!(w.broker.pending_requests(), 0);
}

#[test]
fn test_calls_from_unregistered_peer_are_ignored() {
    let mut w = World::new(HostConfig::default());
    w.broker.unregister(w.client_key);
    let out = w
        .broker
        .handle(w.client_key, MasterMessage::C2mRequestMotd, Instant::now());
    assert!(out.is_empty());
}

#[test]
fn test_client_times_out_on_its_own() {
    let mut client = RendezvousClient::new(ClientConfig::default());
    let start = Instant::now();
    client.request_connection(addr("203.0.113.10:28000"), start);
    client.request_sent();
    client.tick(start + Duration::from_secs(10));
    assert_eq!(client.state(), ClientState::TimedOut);

    // A late answer for the timed-out request changes nothing.
    MasterMessage::M2cArrangedConnectionAccepted {
        request_id: 1,
        possible_addresses: vec![],
        connection_data: ByteBuffer::new(vec![0; BLOB_SIZE]),
    }
    .dispatch(&mut client);
    assert_eq!(client.state(), ClientState::TimedOut);
}

// =========================================================================
// Server list
// =========================================================================

#[test]
fn test_query_skips_hidden_and_other_versions_and_batches() {
    let strings = StringTable::new();
    let mut broker = Broker::new(BrokerConfig::default(), strings);
    let client = broker
        .register(addr("198.51.100.1:1000"), &ConnectRequest::client("Nova"))
        .unwrap()
        .0;

    let mut visible = Vec::new();
    for i in 0..31u16 {
        let a = addr(&format!("203.0.113.1:{}", 20000 + i));
        broker
            .register(a, &ConnectRequest::server(server_info("s")))
            .unwrap();
        visible.push(a);
    }
    let hidden = broker
        .register(
            addr("203.0.113.2:1"),
            &ConnectRequest::server(server_info("hidden")),
        )
        .unwrap()
        .0;
    broker.set_hidden(hidden, true).unwrap();
    let mut old = ConnectRequest::server(server_info("old"));
    old.cs_protocol_version = 0;
    broker.register(addr("203.0.113.3:1"), &old).unwrap();

    let out = broker.handle(client, MasterMessage::C2mQueryServers { query_id: 9 }, Instant::now());
    let batches: Vec<Vec<IpAddress>> = out
        .into_iter()
        .map(|o| match o.message {
            MasterMessage::M2cQueryServersResponse { query_id: 9, servers } => servers,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![30, 1, 0]);
    assert_eq!(batches.concat(), visible);
}

#[test]
fn test_set_hidden_on_client_is_error() {
    let mut w = World::new(HostConfig::default());
    assert!(w.broker.set_hidden(w.client_key, true).is_err());
}

// =========================================================================
// Handshake, status, MOTD
// =========================================================================

#[test]
fn test_register_rejects_old_master_version() {
    let mut broker = Broker::new(BrokerConfig::default(), StringTable::new());
    let mut req = ConnectRequest::client("Relic");
    req.master_protocol_version = 3;
    let err = broker.register(addr("198.51.100.1:1"), &req).unwrap_err();
    assert!(matches!(err, RpcError::VersionMismatch { got: 3, .. }));
    assert_eq!(broker.peer_count(), 0);
}

#[test]
fn test_status_update_only_from_servers() {
    let mut w = World::new(HostConfig::default());
    let status = |strings: &StringTable| MasterMessage::S2mUpdateServerStatus {
        level_name: strings.insert("Canyon", true),
        level_type: strings.insert("KOTH", true),
        bot_count: 2,
        player_count: 5,
        max_players: 16,
        info_flags: 0,
    };
    let now = Instant::now();

    assert!(w.broker.handle(w.client_key, status(&w.strings), now).is_empty());
    assert!(w.broker.server_info(w.client_key).is_none());

    w.broker.handle(w.host_key, status(&w.strings), now);
    let info = w.broker.server_info(w.host_key).unwrap();
    assert_eq!(info.level_name, "Canyon");
    assert_eq!(info.player_count, 5);
    assert_eq!(info.name, "Frontier");

    let rename = MasterMessage::S2mChangeName {
        name: w.strings.insert("Outpost", true),
    };
    w.broker.handle(w.host_key, rename, now);
    assert_eq!(w.broker.server_info(w.host_key).unwrap().name, "Outpost");
}

#[test]
fn test_motd_request_is_answered() {
    let mut w = World::new(HostConfig::default());
    let out = w
        .broker
        .handle(w.client_key, MasterMessage::C2mRequestMotd, Instant::now());
    w.deliver(out);
    assert_eq!(
        w.client.take_events(),
        vec![ClientEvent::Motd {
            master_name: BrokerConfig::default().master_name,
            motd: BrokerConfig::default().motd,
        }]
    );
}

#[test]
fn test_motd_request_uses_build_override() {
    let mut config = BrokerConfig::default();
    config.build_motd.insert(3, "build 3 is retired".into());
    let mut broker = Broker::new(config, StringTable::new());
    let mut old = ConnectRequest::client("Relic");
    old.build = 3;
    let (relic, _) = broker.register(addr("198.51.100.1:1"), &old).unwrap();
    let (nova, _) = broker
        .register(addr("198.51.100.2:1"), &ConnectRequest::client("Nova"))
        .unwrap();

    let motd_for = |broker: &mut Broker, key: PeerKey| {
        match &broker.handle(key, MasterMessage::C2mRequestMotd, Instant::now())[0].message {
            MasterMessage::M2cSetMotd { motd, .. } => motd.clone(),
            other => panic!("unexpected {other:?}"),
        }
    };
    assert_eq!(motd_for(&mut broker, relic), "build 3 is retired");
    assert_eq!(motd_for(&mut broker, nova), BrokerConfig::default().motd);
}

// =========================================================================
// Upgrade status
// =========================================================================

fn upgrade_status(config: BrokerConfig, request: &ConnectRequest) -> Vec<Outbound> {
    let mut broker = Broker::new(config, StringTable::new());
    broker.register(addr("198.51.100.1:1"), request).unwrap().1
}

#[test]
fn test_register_current_client_needs_no_upgrade() {
    let request = ConnectRequest::client("Nova");
    let out = upgrade_status(BrokerConfig::default(), &request);
    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0].message,
        MasterMessage::M2cSendUpgradeStatus {
            needs_upgrade: false
        }
    );
}

#[test]
fn test_register_old_build_needs_upgrade() {
    let config = BrokerConfig {
        latest_build: 9,
        ..BrokerConfig::default()
    };
    let out = upgrade_status(config, &ConnectRequest::client("Nova"));
    assert_eq!(
        out[0].message,
        MasterMessage::M2cSendUpgradeStatus {
            needs_upgrade: true
        }
    );
}

#[test]
fn test_register_old_game_protocol_needs_upgrade() {
    let mut request = ConnectRequest::client("Nova");
    request.cs_protocol_version = 0;
    let out = upgrade_status(BrokerConfig::default(), &request);
    assert_eq!(
        out[0].message,
        MasterMessage::M2cSendUpgradeStatus {
            needs_upgrade: true
        }
    );
}

#[test]
fn test_register_server_gets_no_upgrade_status() {
    let config = BrokerConfig {
        latest_build: 9,
        ..BrokerConfig::default()
    };
    let request = ConnectRequest::server(server_info("Frontier"));
    assert!(upgrade_status(config, &request).is_empty());
}

#[test]
fn test_upgrade_status_reaches_client_events() {
    let mut w = World::new(HostConfig::default());
    let config = BrokerConfig {
        latest_build: 9,
        ..BrokerConfig::default()
    };
    let out = upgrade_status(config, &ConnectRequest::client("Nova"));
    let message = out.into_iter().next().unwrap().message;
    message.dispatch(&mut w.client);
    assert_eq!(w.client.take_events(), vec![ClientEvent::UpgradeStatus(true)]);
}

// =========================================================================
// Global chat
// =========================================================================

#[test]
fn test_global_chat_join_chat_and_leave() {
    let strings = StringTable::new();
    let mut broker = Broker::new(BrokerConfig::default(), strings);
    let now = Instant::now();
    let nova = broker
        .register(addr("198.51.100.1:1"), &ConnectRequest::client("Nova"))
        .unwrap()
        .0;
    let kite = broker
        .register(addr("198.51.100.2:1"), &ConnectRequest::client("Kite"))
        .unwrap()
        .0;

    let out = broker.handle(nova, MasterMessage::C2mJoinGlobalChat, now);
    assert_eq!(out.len(), 1);
    assert!(matches!(&out[0].message, MasterMessage::M2cPlayersInGlobalChat { nicks } if nicks.is_empty()));

    let out = broker.handle(kite, MasterMessage::C2mJoinGlobalChat, now);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].to, nova);
    assert!(matches!(&out[0].message, MasterMessage::M2cPlayerJoinedGlobalChat { nick } if nick.as_string() == "Kite"));
    assert!(matches!(&out[1].message, MasterMessage::M2cPlayersInGlobalChat { nicks } if nicks.len() == 1));

    // Joining twice is a no-op.
    assert!(broker.handle(kite, MasterMessage::C2mJoinGlobalChat, now).is_empty());

    let out = broker.handle(
        nova,
        MasterMessage::C2mSendChat {
            message: "hello".into(),
        },
        now,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, kite);
    assert!(matches!(&out[0].message, MasterMessage::M2cSendChat { is_private: false, message, .. } if message == "hello"));

    let out = broker.handle(nova, MasterMessage::C2mLeaveGlobalChat, now);
    assert_eq!(out.len(), 1);
    assert!(matches!(&out[0].message, MasterMessage::M2cPlayerLeftGlobalChat { nick } if nick.as_string() == "Nova"));
}

#[test]
fn test_private_chat_matches_nick_case_insensitively() {
    let mut broker = Broker::new(BrokerConfig::default(), StringTable::new());
    let now = Instant::now();
    let nova = broker
        .register(addr("198.51.100.1:1"), &ConnectRequest::client("Nova"))
        .unwrap()
        .0;
    let kite = broker
        .register(addr("198.51.100.2:1"), &ConnectRequest::client("Kite"))
        .unwrap()
        .0;

    let out = broker.handle(
        nova,
        MasterMessage::C2mSendChat {
            message: "/KITE meet at B".into(),
        },
        now,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, kite);
    assert!(matches!(
        &out[0].message,
        MasterMessage::M2cSendChat { nick, is_private: true, message }
            if nick.as_string() == "Nova" && message == "meet at B"
    ));

    let malformed = MasterMessage::C2mSendChat {
        message: "/kite".into(),
    };
    assert!(broker.handle(nova, malformed, now).is_empty());
}

#[test]
fn test_disconnect_in_chat_notifies_members() {
    let mut broker = Broker::new(BrokerConfig::default(), StringTable::new());
    let now = Instant::now();
    let nova = broker
        .register(addr("198.51.100.1:1"), &ConnectRequest::client("Nova"))
        .unwrap()
        .0;
    let kite = broker
        .register(addr("198.51.100.2:1"), &ConnectRequest::client("Kite"))
        .unwrap()
        .0;
    broker.handle(nova, MasterMessage::C2mJoinGlobalChat, now);
    broker.handle(kite, MasterMessage::C2mJoinGlobalChat, now);

    let out = broker.unregister(kite);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, nova);
    assert!(matches!(&out[0].message, MasterMessage::M2cPlayerLeftGlobalChat { .. }));
}

#[test]
fn test_chat_survives_packet_encoding() {
    let mut broker = Broker::new(BrokerConfig::default(), StringTable::new());
    let now = Instant::now();
    let nova = broker
        .register(addr("198.51.100.1:1"), &ConnectRequest::client("Nova"))
        .unwrap()
        .0;
    let kite = broker
        .register(addr("198.51.100.2:1"), &ConnectRequest::client("Kite"))
        .unwrap()
        .0;
    broker.handle(nova, MasterMessage::C2mJoinGlobalChat, now);
    broker.handle(kite, MasterMessage::C2mJoinGlobalChat, now);
    let out = broker.handle(
        kite,
        MasterMessage::C2mSendChat {
            message: "gg".into(),
        },
        now,
    );

    // Broker and peer have separate tables, as they would on the wire.
    let mut tx = ConnectionStringTable::new(broker.strings().clone());
    let mut rx = ConnectionStringTable::new(StringTable::new());
    let messages: Vec<MasterMessage> = out.into_iter().map(|o| o.message).collect();
    let packet = encode_packet(&messages, &mut tx);
    let mut client = RendezvousClient::new(ClientConfig::default());
    for message in decode_packet(&packet.bytes, &mut rx).unwrap() {
        message.dispatch(&mut client);
    }
    assert_eq!(
        client.take_events(),
        vec![ClientEvent::Chat {
            nick: "Kite".into(),
            is_private: false,
            message: "gg".into(),
        }]
    );
}
