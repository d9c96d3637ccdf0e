//! Runs a broker on loopback, links a host and a client to it, and walks
//! one arranged connection from server query to accepted keys.
//!
//! Pass a JSON config path to override the broker settings:
//! `cargo run -p rendezvous-demo -- tether.json`

use std::time::Instant;

use tether::prelude::*;

/// Receives calls and feeds them to `target` until `done` matches one.
async fn pump<T: MasterInterface>(
    link: &mut PeerLink,
    target: &mut T,
    done: impl Fn(&MasterMessage) -> bool,
) -> Result<(), TetherError> {
    loop {
        let Some(calls) = link.recv().await? else {
            return Err(tether::transport::TransportError::ConnectionClosed("broker left".into()).into());
        };
        let finished = calls.iter().any(&done);
        for call in calls {
            call.dispatch(target);
        }
        if finished {
            return Ok(());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tether::init_tracing();

    let mut config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    config.bind = "127.0.0.1:0".into();

    let server = BrokerServerBuilder::from_config(config).build().await?;
    let url = format!("ws://{}", server.local_addr()?);
    let broker = server.handle();
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "broker stopped");
        }
    });
    eprintln!("broker listening on {url}");

    let info = ServerInfo {
        max_players: 16,
        level_name: "Harbor".into(),
        level_type: "CTF".into(),
        name: "Demo Host".into(),
        description: "loopback demo".into(),
        ..ServerInfo::default()
    };
    let mut host_link = PeerLink::connect(&url, &ConnectRequest::server(info)).await?;
    let mut client_link = PeerLink::connect(&url, &ConnectRequest::client("Demo Player")).await?;
    let mut host = RendezvousHost::new(HostConfig::default());
    let mut client = RendezvousClient::new(ClientConfig::default());

    client_link.send(&[MasterMessage::C2mRequestMotd]).await?;
    client_link.send(&[client.query_servers()]).await?;
    pump(&mut client_link, &mut client, |m| {
        matches!(m, MasterMessage::M2cQueryServersResponse { servers, .. } if servers.is_empty())
    })
    .await?;
    for event in client.take_events() {
        eprintln!("client event: {event:?}");
    }

    let Some(&target) = client.server_list().first() else {
        return Err("broker listed no hosts".into());
    };
    eprintln!("requesting arranged connection to {target}");
    client_link
        .send(&[client.request_connection(target, Instant::now())])
        .await?;
    client.request_sent();

    pump(&mut host_link, &mut host, |m| {
        matches!(m, MasterMessage::M2sClientRequestedArrangedConnection { .. })
    })
    .await?;
    host_link.send(&host.take_outbound()).await?;

    pump(&mut client_link, &mut client, |m| {
        matches!(
            m,
            MasterMessage::M2cArrangedConnectionAccepted { .. }
                | MasterMessage::M2cArrangedConnectionRejected { .. }
        )
    })
    .await?;

    let pending = host.take_pending();
    match (client.arranged().cloned(), pending.first()) {
        (Some(initiator), Some(answerer)) => {
            eprintln!(
                "client: nonce {} server nonce {} via {:?}",
                initiator.nonce, initiator.server_nonce, initiator.possible_addresses
            );
            eprintln!(
                "host:   nonce {} server nonce {} via {:?}",
                answerer.nonce, answerer.server_nonce, answerer.possible_addresses
            );
            let mut registry = ArrangedRegistry::default();
            eprintln!("first arrival: {:?}", registry.record(answerer));
            eprintln!("second arrival: {:?}", registry.record(answerer));
            client.connected()?;
        }
        _ => eprintln!("request did not complete: {:?}", client.state()),
    }

    let stats = broker.stats().await?;
    eprintln!("broker: {} peers, {} pending", stats.peers, stats.pending_requests);
    host_link.close().await?;
    client_link.close().await?;
    broker.shutdown().await?;
    Ok(())
}
