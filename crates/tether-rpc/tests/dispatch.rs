//! Integration tests for call marshalling and dispatch.
//!
//! A call is built on one side, encoded into a packet, decoded on the
//! other side with a separate dictionary, and dispatched into a recording
//! target. The target must see exactly the arguments the caller supplied.

use tether_rpc::{
    MESSAGE_COUNT, MasterInterface, MasterMessage, RpcError, decode_packet, encode_packet,
};
use tether_strings::{ConnectionStringTable, ENTRY_BITS, StringTable, StringTableEntry};
use tether_wire::{BitStream, ByteBuffer, IpAddress};

// =========================================================================
// Recording target
// =========================================================================

#[derive(Default)]
struct Recorder {
    requested: Vec<(u32, Vec<IpAddress>, ByteBuffer)>,
    chats: Vec<(String, bool, String)>,
    motd_requests: usize,
}

impl MasterInterface for Recorder {
    fn m2s_client_requested_arranged_connection(
        &mut self,
        request_id: u32,
        possible_addresses: Vec<IpAddress>,
        params: ByteBuffer,
    ) {
        self.requested.push((request_id, possible_addresses, params));
    }

    fn m2c_send_chat(&mut self, nick: StringTableEntry, is_private: bool, message: String) {
        self.chats.push((nick.as_string(), is_private, message));
    }

    fn c2m_request_motd(&mut self) {
        self.motd_requests += 1;
    }
}

struct Link {
    tx: ConnectionStringTable,
    rx: ConnectionStringTable,
}

impl Link {
    fn new(table: &StringTable) -> Self {
        Self {
            tx: ConnectionStringTable::new(table.clone()),
            rx: ConnectionStringTable::new(table.clone()),
        }
    }

    /// Sends `calls` across and dispatches them into `target`.
    fn deliver(&mut self, calls: &[MasterMessage], target: &mut impl MasterInterface) {
        let packet = encode_packet(calls, &mut self.tx);
        let decoded = decode_packet(&packet.bytes, &mut self.rx).expect("decodes");
        self.tx.packet_received(packet.notes);
        for call in decoded {
            call.dispatch(target);
        }
    }
}

fn addr(s: &str) -> IpAddress {
    s.parse().unwrap()
}

// =========================================================================
// Dispatch
// =========================================================================

#[test]
fn test_three_arg_call_dispatches_same_arguments() {
    let table = StringTable::new();
    let mut link = Link::new(&table);
    let mut target = Recorder::default();

    let a = 77u32;
    let b = vec![addr("10.0.0.2:28001"), addr("10.0.0.2:28000")];
    let c = ByteBuffer::from(&b"TTHR\0"[..]);

    link.deliver(
        &[MasterMessage::M2sClientRequestedArrangedConnection {
            request_id: a,
            possible_addresses: b.clone(),
            params: c.clone(),
        }],
        &mut target,
    );

    assert_eq!(target.requested, vec![(a, b, c)]);
}

#[test]
fn test_string_entry_argument_survives_dictionary() {
    let table = StringTable::new();
    let mut link = Link::new(&table);
    let mut target = Recorder::default();
    let nick = table.insert("Nova", true);

    let call = MasterMessage::M2cSendChat {
        nick: nick.clone(),
        is_private: true,
        message: "gg".into(),
    };
    // Second delivery goes by slot index after the first was confirmed.
    link.deliver(std::slice::from_ref(&call), &mut target);
    link.deliver(&[call], &mut target);

    assert_eq!(
        target.chats,
        vec![
            ("Nova".to_string(), true, "gg".to_string()),
            ("Nova".to_string(), true, "gg".to_string()),
        ]
    );
}

#[test]
fn test_unhandled_calls_are_ignored() {
    let table = StringTable::new();
    let mut link = Link::new(&table);
    let mut target = Recorder::default();

    link.deliver(
        &[
            MasterMessage::C2mQueryServers { query_id: 3 },
            MasterMessage::C2mRequestMotd,
            MasterMessage::C2mJoinGlobalChat,
        ],
        &mut target,
    );

    assert_eq!(target.motd_requests, 1);
    assert!(target.requested.is_empty());
}

#[test]
fn test_corrupt_packet_delivers_nothing() {
    let table = StringTable::new();
    let mut tx = ConnectionStringTable::new(table.clone());
    let mut rx = ConnectionStringTable::new(table);

    let packet = encode_packet(
        &[
            MasterMessage::C2mRequestMotd,
            MasterMessage::M2cSetMotd {
                master_name: "Tether".into(),
                motd: "a long message of the day".into(),
            },
        ],
        &mut tx,
    );
    let mut bytes = packet.bytes;
    bytes.truncate(bytes.len() / 2);

    assert!(matches!(
        decode_packet(&bytes, &mut rx),
        Err(RpcError::Truncated(_))
    ));
}

#[test]
fn test_reference_to_unfilled_slot_rejects_packet() {
    let mut rx = ConnectionStringTable::new(StringTable::new());

    // s2m_change_name whose name claims slot 5 is already known.
    let mut stream = BitStream::new();
    stream.write_flag(true);
    stream.write_ranged_u32(18, 0, MESSAGE_COUNT - 1);
    stream.write_int(5, ENTRY_BITS);
    stream.write_flag(true);
    stream.write_flag(false);

    assert!(matches!(
        decode_packet(&stream.into_bytes(), &mut rx),
        Err(RpcError::Truncated(_))
    ));
}
