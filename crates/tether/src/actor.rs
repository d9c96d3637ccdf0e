//! Broker actor: one Tokio task that owns the [`Broker`].
//!
//! Connection handlers never touch broker state. They send commands over
//! an mpsc channel and receive the broker's calls for their peer on a
//! per-peer outbound channel. A `tokio::time::interval` drives request
//! expiry between commands.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tether_rendezvous::{Broker, BrokerConfig, Outbound, PeerKey, RendezvousError};
use tether_rpc::{ConnectRequest, MasterMessage, RpcError};
use tether_strings::StringTable;
use tether_wire::IpAddress;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::TetherError;

/// Channel the actor uses to reach one connected peer.
pub(crate) type PeerSender = mpsc::UnboundedSender<MasterMessage>;

/// Commands accepted by the broker actor.
pub(crate) enum BrokerCommand {
    Register {
        address: IpAddress,
        request: ConnectRequest,
        outbound: PeerSender,
        reply: oneshot::Sender<Result<PeerKey, RpcError>>,
    },

    /// Calls decoded from one packet, in order.
    Calls {
        from: PeerKey,
        messages: Vec<MasterMessage>,
    },

    Unregister {
        key: PeerKey,
    },

    SetHidden {
        key: PeerKey,
        hidden: bool,
        reply: oneshot::Sender<Result<(), RendezvousError>>,
    },

    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },

    Shutdown,
}

/// Counters reported by [`BrokerHandle::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub peers: usize,
    pub pending_requests: usize,
}

/// Handle to the running broker actor. Cheap to clone.
#[derive(Clone)]
pub struct BrokerHandle {
    sender: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    /// Starts the actor on the current runtime.
    pub fn spawn(config: BrokerConfig, strings: StringTable) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        let actor = BrokerActor {
            broker: Broker::new(config, strings),
            routes: HashMap::new(),
            receiver,
        };
        tokio::spawn(actor.run());
        Self { sender }
    }

    async fn send(&self, command: BrokerCommand) -> Result<(), TetherError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| TetherError::BrokerUnavailable)
    }

    /// Registers a peer whose handshake arrived; its calls from the broker
    /// will be pushed into `outbound`.
    ///
    /// # Errors
    /// - [`TetherError::Rpc`] if the broker refuses the versions.
    /// - [`TetherError::BrokerUnavailable`] if the actor is gone.
    pub(crate) async fn register(
        &self,
        address: IpAddress,
        request: ConnectRequest,
        outbound: PeerSender,
    ) -> Result<PeerKey, TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Register {
            address,
            request,
            outbound,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| TetherError::BrokerUnavailable)??)
    }

    pub(crate) async fn deliver(
        &self,
        from: PeerKey,
        messages: Vec<MasterMessage>,
    ) -> Result<(), TetherError> {
        self.send(BrokerCommand::Calls { from, messages }).await
    }

    pub(crate) async fn unregister(&self, key: PeerKey) -> Result<(), TetherError> {
        self.send(BrokerCommand::Unregister { key }).await
    }

    /// Hides a server from query results, or shows it again.
    pub async fn set_hidden(&self, key: PeerKey, hidden: bool) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::SetHidden { key, hidden, reply })
            .await?;
        Ok(rx.await.map_err(|_| TetherError::BrokerUnavailable)??)
    }

    pub async fn stats(&self) -> Result<BrokerStats, TetherError> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Stats { reply }).await?;
        rx.await.map_err(|_| TetherError::BrokerUnavailable)
    }

    /// Stops the actor. Connected handlers see the broker as unavailable.
    pub async fn shutdown(&self) -> Result<(), TetherError> {
        self.send(BrokerCommand::Shutdown).await
    }
}

struct BrokerActor {
    broker: Broker,
    routes: HashMap<PeerKey, PeerSender>,
    receiver: mpsc::Receiver<BrokerCommand>,
}

impl BrokerActor {
    async fn run(mut self) {
        let period = self.broker.config().tick_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(?period, "broker actor started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let out = self.broker.tick(Instant::now());
                    self.route(out);
                }
            }
        }

        tracing::info!("broker actor stopped");
    }

    /// Returns `false` to stop.
    fn handle(&mut self, command: BrokerCommand) -> bool {
        match command {
            BrokerCommand::Register {
                address,
                request,
                outbound,
                reply,
            } => {
                let result = self
                    .broker
                    .register(address, &request)
                    .map(|(key, greeting)| {
                        self.routes.insert(key, outbound);
                        self.route(greeting);
                        key
                    });
                let _ = reply.send(result);
            }
            BrokerCommand::Calls { from, messages } => {
                let now = Instant::now();
                for message in messages {
                    let out = self.broker.handle(from, message, now);
                    self.route(out);
                }
            }
            BrokerCommand::Unregister { key } => {
                self.routes.remove(&key);
                let out = self.broker.unregister(key);
                self.route(out);
            }
            BrokerCommand::SetHidden { key, hidden, reply } => {
                let _ = reply.send(self.broker.set_hidden(key, hidden));
            }
            BrokerCommand::Stats { reply } => {
                let _ = reply.send(BrokerStats {
                    peers: self.broker.peer_count(),
                    pending_requests: self.broker.pending_requests(),
                });
            }
            BrokerCommand::Shutdown => {
                tracing::info!("broker shutting down");
                return false;
            }
        }
        true
    }

    fn route(&self, out: Vec<Outbound>) {
        for Outbound { to, message } in out {
            match self.routes.get(&to) {
                Some(tx) => {
                    if tx.send(message).is_err() {
                        tracing::trace!(peer = %to, "peer channel closed, call dropped");
                    }
                }
                None => tracing::trace!(peer = %to, "no route, call dropped"),
            }
        }
    }
}
