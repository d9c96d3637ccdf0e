//! Integration tests for the WebSocket transport.
//!
//! A real listener on `127.0.0.1:0` and a real client: frames must arrive
//! whole and in order, and a close must read as `None`.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tether_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
    use tokio_tungstenite::tungstenite::Message;

    async fn bind() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let (mut client_ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);
        assert!(server_conn.peer_addr().unwrap().ip().is_loopback());

        server_conn
            .send(b"\x01\x02packet")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"\x01\x02packet");

        client_ws
            .send(Message::Binary(b"from peer".to_vec().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"from peer");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let (mut client_ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_dialed_connection_talks_to_accepted_one() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let peer = WebSocketConnection::connect(&format!("ws://{addr}"))
            .await
            .expect("should dial");
        let server_conn = server_handle.await.unwrap();
        assert_eq!(peer.peer_addr().unwrap().to_string(), addr);

        peer.send(b"one").await.unwrap();
        peer.send(b"two").await.unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"one");
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_send_while_recv_is_pending() {
        let (mut transport, addr) = bind().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let peer = std::sync::Arc::new(
            WebSocketConnection::connect(&format!("ws://{addr}"))
                .await
                .unwrap(),
        );
        let server_conn = server_handle.await.unwrap();

        // A receiver parked on the peer must not block the peer's sends.
        let reader = {
            let peer = std::sync::Arc::clone(&peer);
            tokio::spawn(async move { peer.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), peer.send(b"ping"))
            .await
            .expect("send must not wait for recv")
            .unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"ping");

        server_conn.send(b"pong").await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap().unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let (transport, addr) = bind().await;
        drop(transport);
        let result = WebSocketConnection::connect(&format!("ws://{addr}")).await;
        assert!(result.is_err());
    }
}
