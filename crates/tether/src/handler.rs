//! Per-connection handler: handshake, registration, and call routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive a `ConnectRequest` within the handshake timeout
//!   2. Register with the broker (version check) and answer the handshake
//!   3. Loop: decode inbound packets for the broker, encode the broker's
//!      calls for this peer into outbound packets

use std::time::Duration;

use tether_rendezvous::PeerKey;
use tether_rpc::{ConnectRequest, HandshakeReply, decode_packet, encode_packet};
use tether_strings::{ConnectionStringTable, StringTable};
use tether_transport::{Connection, TransportError, WebSocketConnection};
use tether_wire::IpAddress;
use tokio::sync::mpsc;

use crate::actor::BrokerHandle;
use crate::TetherError;

/// Unregisters the peer when the handler exits, including on panic.
///
/// `Drop` is synchronous, so the unregister is sent from a spawned task.
struct PeerGuard {
    key: PeerKey,
    broker: BrokerHandle,
}

impl Drop for PeerGuard {
    fn drop(&mut self) {
        let key = self.key;
        let broker = self.broker.clone();
        tokio::spawn(async move {
            let _ = broker.unregister(key).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    broker: BrokerHandle,
    strings: StringTable,
    handshake_timeout: Duration,
) -> Result<(), TetherError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let request = receive_handshake(&conn, handshake_timeout).await?;
    let address = observed_address(&conn)?;

    let (outbound, mut calls) = mpsc::unbounded_channel();
    let key = match broker.register(address, request, outbound).await {
        Ok(key) => key,
        Err(e) => {
            reject(&conn, &e.to_string()).await;
            return Err(e);
        }
    };
    let _guard = PeerGuard {
        key,
        broker: broker.clone(),
    };
    conn.send(&HandshakeReply::Accepted.encode()).await?;
    tracing::info!(%conn_id, peer = %key, %address, "peer registered");

    let mut dictionary = ConnectionStringTable::new(strings);
    loop {
        tokio::select! {
            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(peer = %key, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %key, error = %e, "recv error");
                        break;
                    }
                };
                match decode_packet(&data, &mut dictionary) {
                    Ok(messages) if messages.is_empty() => {}
                    Ok(messages) => broker.deliver(key, messages).await?,
                    Err(e) => {
                        tracing::debug!(peer = %key, error = %e, "dropping undecodable packet");
                    }
                }
            }
            Some(first) = calls.recv() => {
                let mut batch = vec![first];
                while let Ok(next) = calls.try_recv() {
                    batch.push(next);
                }
                let packet = encode_packet(&batch, &mut dictionary);
                conn.send(&packet.bytes).await?;
                // Frames are reliable and ordered, so a completed send
                // confirms every string it carried.
                dictionary.packet_received(packet.notes);
            }
        }
    }

    // _guard drops here and the broker forgets the peer.
    Ok(())
}

/// Waits for the first frame and decodes it as a [`ConnectRequest`].
///
/// A frame that does not decode gets a rejection before the error returns.
async fn receive_handshake(
    conn: &WebSocketConnection,
    timeout: Duration,
) -> Result<ConnectRequest, TetherError> {
    let data = match tokio::time::timeout(timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(
                TransportError::ConnectionClosed("closed before handshake".into()).into(),
            );
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TetherError::Timeout("handshake")),
    };

    match ConnectRequest::decode(&data) {
        Ok(request) => Ok(request),
        Err(e) => {
            reject(conn, "malformed handshake").await;
            Err(e.into())
        }
    }
}

fn observed_address(conn: &WebSocketConnection) -> Result<IpAddress, TetherError> {
    let addr = conn
        .peer_addr()
        .ok_or_else(|| TransportError::ConnectionClosed("peer address unknown".into()))?;
    Ok(IpAddress::try_from(addr)?)
}

/// Best effort: the peer may already be gone.
async fn reject(conn: &WebSocketConnection, reason: &str) {
    let reply = HandshakeReply::Rejected {
        reason: reason.to_owned(),
    };
    if let Err(e) = conn.send(&reply.encode()).await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "could not send rejection");
    }
    let _ = conn.close().await;
}
