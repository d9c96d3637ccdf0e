//! `BrokerServer` builder and accept loop.
//!
//! This is the entry point for running a rendezvous broker. It ties
//! together the layers: transport, packet codec, and the broker actor.

use std::time::Duration;

use tether_rendezvous::BrokerConfig;
use tether_strings::StringTable;
use tether_transport::{Transport, WebSocketTransport};

use crate::actor::BrokerHandle;
use crate::handler::handle_connection;
use crate::{ServerConfig, TetherError};

/// Builder for configuring and starting a broker server.
///
/// # Example
///
/// ```rust,ignore
/// use tether::prelude::*;
///
/// let server = BrokerServer::builder()
///     .bind("0.0.0.0:28000")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct BrokerServerBuilder {
    bind_addr: String,
    config: BrokerConfig,
    handshake_timeout: Duration,
}

impl BrokerServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Starts from a loaded [`ServerConfig`].
    pub fn from_config(config: ServerConfig) -> Self {
        let handshake_timeout = config.handshake_timeout();
        Self {
            bind_addr: config.bind,
            config: config.broker,
            handshake_timeout,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and starts the broker actor.
    pub async fn build(self) -> Result<BrokerServer, TetherError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let strings = StringTable::new();
        let broker = BrokerHandle::spawn(self.config, strings.clone());

        Ok(BrokerServer {
            transport,
            broker,
            strings,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

impl Default for BrokerServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound broker server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BrokerServer {
    transport: WebSocketTransport,
    broker: BrokerHandle,
    strings: StringTable,
    handshake_timeout: Duration,
}

impl BrokerServer {
    /// Creates a new builder.
    pub fn builder() -> BrokerServerBuilder {
        BrokerServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the broker actor, for stats and shutdown.
    pub fn handle(&self) -> BrokerHandle {
        self.broker.clone()
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task for each connection. Runs until the process
    /// is terminated.
    pub async fn run(mut self) -> Result<(), TetherError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "broker server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let broker = self.broker.clone();
                    let strings = self.strings.clone();
                    let timeout = self.handshake_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, broker, strings, timeout).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
