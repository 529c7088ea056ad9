//! Sync behaviour over a simulated network with loss, reordering and
//! unreachable peers.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use rtgs_client::SyncClient;
use rtgs_server::SyncServer;
use rtgs_shared::{
    config::{ClientConfig, ServerConfig},
    math::{Vec3, Vec3d},
    net::{encode_world_update, DatagramSocket, WorldUpdate},
    participant::{Participant, ParticipantKind},
};
use rtgs_tests::{init_tracing, Faults, SimNetwork, SimSocket};
use tokio::time;

const SERVER: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
    8888,
);

fn peer(last: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last], 5000))
}

fn server_on(net: &Arc<SimNetwork>) -> SyncServer<SimSocket> {
    SyncServer::with_socket(ServerConfig::default(), net.bind(SERVER))
}

fn client_on(net: &Arc<SimNetwork>, addr: SocketAddr) -> SyncClient<SimSocket> {
    let cfg = ClientConfig {
        server_addr: SERVER.to_string(),
        ..Default::default()
    };
    SyncClient::with_socket(cfg, SERVER, net.bind(addr))
}

/// Processes queued datagrams until the server has been idle for a moment.
async fn drain_server(server: &SyncServer<SimSocket>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 1024];
    while let Ok(r) = time::timeout(Duration::from_millis(5), server.recv_once(&mut buf)).await {
        r?;
    }
    Ok(())
}

async fn drain_client(client: &SyncClient<SimSocket>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; ClientConfig::default().recv_buffer];
    while let Ok(r) = time::timeout(Duration::from_millis(5), client.recv_once(&mut buf)).await {
        r?;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn membership_converges_despite_loss() -> anyhow::Result<()> {
    init_tracing();
    let net = SimNetwork::new();
    let server = server_on(&net);
    let clients = [client_on(&net, peer(2)), client_on(&net, peer(3))];

    net.set_faults(Faults {
        drop_every: Some(3),
        reorder_pairs: false,
    });
    for seq in 1..=4 {
        for c in &clients {
            c.send_heartbeat(seq).await?;
        }
    }
    drain_server(&server).await?;
    assert!(net.dropped() > 0);
    assert_eq!(server.registry().endpoints(), vec![peer(2), peer(3)]);

    // Some broadcasts are lost; repeated ticks still get through.
    for _ in 0..4 {
        server.broadcast_once().await;
    }
    for c in &clients {
        drain_client(c).await?;
        let ids: Vec<_> = c.mirror().list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, [peer(2).to_string(), peer(3).to_string()]);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn default_client_receives_large_snapshot() -> anyhow::Result<()> {
    let net = SimNetwork::new();
    let server = server_on(&net);
    for i in 0..60u8 {
        server.handle_datagram(SocketAddr::from(([10, 0, 1, i], 5000)), b"x");
    }
    let client = client_on(&net, peer(2)).spawn();
    time::sleep(Duration::from_millis(50)).await;
    drain_server(&server).await?;
    assert_eq!(server.registry().len(), 61);

    let encoded = encode_world_update(&WorldUpdate::from_participants(
        &server.registry().snapshot(),
    ))?;
    assert!(encoded.len() > 4096, "snapshot is only {} bytes", encoded.len());

    let report = server.broadcast_once().await;
    assert_eq!(report.participants, 61);
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.mirror().len(), 61);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reordered_snapshots_resolve_to_last_arrival() -> anyhow::Result<()> {
    let net = SimNetwork::new();
    let fake_server = net.bind(SERVER);
    let client = client_on(&net, peer(2));

    let at = |x: f32| {
        let p = Participant {
            id: "p".into(),
            kind: ParticipantKind::Player,
            location: Vec3::new(x, 0.0, 0.0),
            orientation: 0.0,
            active: true,
        };
        encode_world_update(&WorldUpdate::from_participants([&p]))
    };

    // In order: the second send wins.
    fake_server.send_to(&at(1.0)?, peer(2)).await?;
    fake_server.send_to(&at(2.0)?, peer(2)).await?;
    drain_client(&client).await?;
    assert_eq!(client.mirror().get("p").map(|e| e.location), Some(Vec3d::new(2.0, 0.0, 0.0)));

    // Swapped in flight: the older snapshot arrives last and wins.
    net.set_faults(Faults {
        drop_every: None,
        reorder_pairs: true,
    });
    fake_server.send_to(&at(3.0)?, peer(2)).await?;
    fake_server.send_to(&at(4.0)?, peer(2)).await?;
    drain_client(&client).await?;
    assert_eq!(client.mirror().get("p").map(|e| e.location), Some(Vec3d::new(3.0, 0.0, 0.0)));
    assert_eq!(client.mirror().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unreachable_peer_does_not_block_others() -> anyhow::Result<()> {
    let net = SimNetwork::new();
    let server = server_on(&net);
    let a = client_on(&net, peer(2));
    let b = client_on(&net, peer(3));
    a.send_heartbeat(1).await?;
    b.send_heartbeat(1).await?;
    drain_server(&server).await?;

    net.set_unreachable(peer(2), true);
    let report = server.broadcast_once().await;
    assert_eq!((report.sent, report.failed), (1, 1));

    drain_client(&b).await?;
    assert_eq!(b.mirror().len(), 2);
    assert!(a.mirror().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_evicted_then_respawned() -> anyhow::Result<()> {
    let net = SimNetwork::new();
    let server = server_on(&net);
    let quiet = client_on(&net, peer(2));
    let chatty = client_on(&net, peer(3));

    quiet.send_heartbeat(1).await?;
    chatty.send_heartbeat(1).await?;
    drain_server(&server).await?;

    // 35 s elapse; only the chatty peer keeps heartbeating.
    for seq in 2..=8 {
        time::advance(Duration::from_secs(5)).await;
        chatty.send_heartbeat(seq).await?;
        drain_server(&server).await?;
    }
    assert_eq!(server.evict_once(), vec![peer(2)]);

    let report = server.broadcast_once().await;
    assert_eq!(report.participants, 1);
    drain_client(&chatty).await?;
    assert!(chatty.mirror().get(&peer(3).to_string()).is_some());

    // Traffic resumes: exactly one fresh session and spawn.
    let resumed_at = time::Instant::now();
    assert!(server.handle_datagram(peer(2), b"Message 9"));
    assert!(!server.handle_datagram(peer(2), b"Message 10"));
    assert_eq!(server.registry().len(), 2);
    let back = server
        .registry()
        .sessions()
        .into_iter()
        .find(|s| s.endpoint == peer(2))
        .expect("re-registered session");
    assert!(back.last_activity_at >= resumed_at);
    assert_eq!(back.participant.map(|p| p.id), Some(peer(2).to_string()));
    server.broadcast_once().await;
    drain_client(&quiet).await?;
    assert_eq!(quiet.mirror().len(), 2);
    Ok(())
}

/// Spawned tasks on paused time: reference periods end to end.
#[tokio::test(start_paused = true)]
async fn background_loops_track_membership() -> anyhow::Result<()> {
    let net = SimNetwork::new();
    let server = server_on(&net).spawn();
    let client = client_on(&net, peer(2)).spawn();

    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(server.registry().len(), 1);
    assert_eq!(client.mirror().len(), 1);

    client.shutdown();
    // Timeout is 30 s and eviction runs every 10 s.
    time::sleep(Duration::from_secs(29)).await;
    assert_eq!(server.registry().len(), 1);
    time::sleep(Duration::from_secs(12)).await;
    assert!(server.registry().is_empty());
    Ok(())
}
