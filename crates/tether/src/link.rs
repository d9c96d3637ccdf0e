//! Peer side of a broker connection.
//!
//! A [`PeerLink`] performs the handshake and then moves whole packets of
//! calls. What to do with the calls is up to the caller; typically they are
//! dispatched into a `RendezvousHost` or `RendezvousClient`.

use std::time::Duration;

use tether_rpc::{ConnectRequest, HandshakeReply, MasterMessage, decode_packet, encode_packet};
use tether_strings::{ConnectionStringTable, StringTable};
use tether_transport::{Connection, TransportError, WebSocketConnection};

use crate::TetherError;

/// How long to wait for the broker's handshake reply.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A handshaken connection to a broker.
pub struct PeerLink {
    conn: WebSocketConnection,
    dictionary: ConnectionStringTable,
}

impl PeerLink {
    /// Connects with a fresh string table.
    pub async fn connect(url: &str, request: &ConnectRequest) -> Result<Self, TetherError> {
        Self::connect_with_table(url, request, StringTable::new()).await
    }

    /// Dials `url`, sends `request`, and waits for the reply.
    ///
    /// # Errors
    /// - [`TetherError::Rpc`] with `Rejected` if the broker refuses.
    /// - [`TetherError::Timeout`] if no reply arrives in time.
    /// - [`TetherError::Transport`] on connection failure.
    pub async fn connect_with_table(
        url: &str,
        request: &ConnectRequest,
        strings: StringTable,
    ) -> Result<Self, TetherError> {
        let conn = WebSocketConnection::connect(url).await?;
        conn.send(&request.encode()).await?;

        let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(
                    TransportError::ConnectionClosed("closed during handshake".into()).into(),
                );
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(TetherError::Timeout("handshake")),
        };
        HandshakeReply::decode(&data)?.into_result()?;
        tracing::info!(url, role = request.role.display_name(), "linked to broker");

        Ok(Self {
            conn,
            dictionary: ConnectionStringTable::new(strings),
        })
    }

    /// The table interned strings on this link resolve into.
    pub fn strings(&self) -> &StringTable {
        self.dictionary.table()
    }

    /// Sends `messages` as one packet.
    pub async fn send(&mut self, messages: &[MasterMessage]) -> Result<(), TetherError> {
        let packet = encode_packet(messages, &mut self.dictionary);
        match self.conn.send(&packet.bytes).await {
            Ok(()) => {
                self.dictionary.packet_received(packet.notes);
                Ok(())
            }
            Err(e) => {
                self.dictionary.packet_dropped(packet.notes);
                Err(e.into())
            }
        }
    }

    /// Receives the next packet's calls. `None` once the broker closes.
    ///
    /// Packets that fail to decode are skipped.
    pub async fn recv(&mut self) -> Result<Option<Vec<MasterMessage>>, TetherError> {
        loop {
            let Some(data) = self.conn.recv().await? else {
                return Ok(None);
            };
            match decode_packet(&data, &mut self.dictionary) {
                Ok(messages) => return Ok(Some(messages)),
                Err(e) => {
                    tracing::debug!(conn_id = %self.conn.id(), error = %e, "dropping undecodable packet");
                }
            }
        }
    }

    pub async fn close(self) -> Result<(), TetherError> {
        self.conn.close().await?;
        Ok(())
    }
}
