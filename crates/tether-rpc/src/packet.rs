//! Packets: ordered runs of calls in one frame.
//!
//! ```text
//! [1][call][1][call]...[0]
//! ```
//!
//! Calls decode and dispatch in the order they were written. A packet that
//! fails to decode is dropped whole; the calls before the bad one are not
//! delivered either, so a receiver never acts on half a packet.

use tether_strings::{ConnectionStringTable, PacketNotes};
use tether_wire::BitStream;

use crate::{MasterMessage, RpcError};

/// An encoded packet plus the dictionary notes for the strings it carried
/// in full. Report the notes back to the dictionary once delivery is known.
#[derive(Debug)]
pub struct EncodedPacket {
    pub bytes: Vec<u8>,
    pub notes: PacketNotes,
}

/// Encodes `messages` into one packet.
pub fn encode_packet(
    messages: &[MasterMessage],
    strings: &mut ConnectionStringTable,
) -> EncodedPacket {
    let mut stream = BitStream::with_capacity(64);
    for message in messages {
        stream.write_flag(true);
        message.encode(&mut stream, strings);
    }
    stream.write_flag(false);
    EncodedPacket {
        bytes: stream.into_bytes(),
        notes: strings.take_packet_notes(),
    }
}

/// Decodes every call in a packet, in order.
///
/// # Errors
/// The first [`RpcError`] hit; nothing from the packet is returned then.
pub fn decode_packet(
    bytes: &[u8],
    strings: &mut ConnectionStringTable,
) -> Result<Vec<MasterMessage>, RpcError> {
    let mut stream = BitStream::from_bytes(bytes.to_vec());
    let mut messages = Vec::new();
    loop {
        let more = stream.read_flag();
        stream.check()?;
        if !more {
            break;
        }
        messages.push(MasterMessage::decode(&mut stream, strings)?);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_strings::StringTable;

    #[test]
    fn test_empty_packet_is_one_byte() {
        let mut strings = ConnectionStringTable::new(StringTable::new());
        let packet = encode_packet(&[], &mut strings);
        assert_eq!(packet.bytes, vec![0]);
        assert!(decode_packet(&packet.bytes, &mut strings).unwrap().is_empty());
    }

    #[test]
    fn test_packet_preserves_call_order() {
        let table = StringTable::new();
        let mut tx = ConnectionStringTable::new(table.clone());
        let mut rx = ConnectionStringTable::new(table);
        let calls = vec![
            MasterMessage::C2mQueryServers { query_id: 1 },
            MasterMessage::C2mRequestMotd,
            MasterMessage::C2mQueryServers { query_id: 2 },
        ];
        let packet = encode_packet(&calls, &mut tx);
        assert_eq!(decode_packet(&packet.bytes, &mut rx).unwrap(), calls);
    }

    #[test]
    fn test_packet_collects_string_notes() {
        let table = StringTable::new();
        let mut tx = ConnectionStringTable::new(table.clone());
        let calls = vec![MasterMessage::S2mChangeName {
            name: table.insert("Frontier", true),
        }];
        let packet = encode_packet(&calls, &mut tx);
        assert_eq!(packet.notes.len(), 1);
    }

    #[test]
    fn test_missing_terminator_is_truncated() {
        let mut strings = ConnectionStringTable::new(StringTable::new());
        assert!(matches!(
            decode_packet(&[], &mut strings),
            Err(RpcError::Truncated(_))
        ));
    }
}
