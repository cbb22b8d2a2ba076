//! End-to-end session tests over a real Unix-domain socket, with the
//! test acting as the RIB manager.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use riblink::zserv::buffer::InboundBuffer;
use riblink::zserv::message::{encode_message, encode_router_id};
use riblink::{
    ClientConfig, ClientHandle, Command, Event, EventKind, Ipv4Prefix, Ipv4Route, Prefix,
    RequestError, RouteType, Safi, Session, SessionState, UnixTransport,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn socket_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("riblink-it-{}-{}.sock", tag, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn test_config() -> ClientConfig {
    ClientConfig {
        retry_delay: Duration::from_millis(20),
        retry_delay_max: Duration::from_millis(200),
    }
}

async fn wait_for_state(handle: &ClientHandle, state: SessionState) {
    let mut status = handle.status_stream();
    timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.state == state),
    )
    .await
    .expect("timed out waiting for session state")
    .expect("session task gone");
}

/// Read `count` framed messages from the client side of the socket.
async fn read_messages(
    stream: &mut UnixStream,
    buf: &mut InboundBuffer,
    count: usize,
) -> Vec<(u16, Bytes)> {
    timeout(Duration::from_secs(5), async {
        let mut messages = Vec::new();
        while messages.len() < count {
            if let Some(raw) = buf.try_extract().expect("client sent bad framing") {
                messages.push((raw.command, raw.payload));
                continue;
            }
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await.expect("read from client");
            assert!(n > 0, "client closed the connection unexpectedly");
            buf.extend(&chunk[..n]);
        }
        messages
    })
    .await
    .expect("timed out reading client messages")
}

#[tokio::test]
async fn session_connects_replays_and_survives_manager_restart() {
    init_logging();
    let path = socket_path("restart");
    let listener = UnixListener::bind(&path).unwrap();

    let (session, client) = Session::new(test_config(), UnixTransport::new(&path));
    tokio::spawn(session.run());

    // Handlers and subscriptions set up before the session is enabled.
    let (event_tx, mut events) = mpsc::unbounded_channel();
    client
        .register(EventKind::RouterIdUpdate, move |event: &Event, _len| {
            event_tx.send(event.clone()).map_err(|e| e.to_string())
        })
        .await
        .unwrap();
    client.redistribute_add(RouteType::Static).await.unwrap();
    client.enable().await.unwrap();

    // First connection: router-id and interface sync, then the replayed
    // subscription.
    let (mut manager, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    wait_for_state(&client, SessionState::Connected).await;

    let mut inbound = InboundBuffer::new();
    let messages = read_messages(&mut manager, &mut inbound, 3).await;
    assert_eq!(
        messages.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        vec![
            Command::RouterIdAdd as u16,
            Command::InterfaceAdd as u16,
            Command::RedistributeAdd as u16,
        ]
    );
    assert_eq!(&messages[2].1[..], &[RouteType::Static as u8]);

    // The manager announces its router id, split across two writes to
    // exercise reassembly over the real socket.
    let router_id = Prefix::V4(Ipv4Prefix::new(Ipv4Addr::new(192, 0, 2, 1), 32));
    let wire = encode_message(Command::RouterIdUpdate, &encode_router_id(&router_id));
    manager.write_all(&wire[..5]).await.unwrap();
    manager.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    manager.write_all(&wire[5..]).await.unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, Event::RouterIdUpdate(router_id));

    // A route request flows through while connected.
    let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 42, 0, 0), 16);
    let route = Ipv4Route {
        route_type: RouteType::Static,
        flags: 0,
        safi: Safi::Unicast,
        nexthops: Some(vec![Ipv4Addr::new(192, 0, 2, 254)]),
        ifindexes: None,
        distance: None,
        metric: Some(10),
    };
    client.ipv4_route_add(prefix, &route).await.unwrap();
    let messages = read_messages(&mut manager, &mut inbound, 1).await;
    assert_eq!(messages[0].0, Command::Ipv4RouteAdd as u16);

    // Manager restart: drop the connection, client notices, reconnects,
    // and replays the same subscription set.
    drop(manager);
    wait_for_state(&client, SessionState::Disconnected).await;

    let (mut manager, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    wait_for_state(&client, SessionState::Connected).await;
    assert_eq!(client.status().failures, 0);

    let mut inbound = InboundBuffer::new();
    let messages = read_messages(&mut manager, &mut inbound, 3).await;
    assert_eq!(
        messages.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        vec![
            Command::RouterIdAdd as u16,
            Command::InterfaceAdd as u16,
            Command::RedistributeAdd as u16,
        ]
    );

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn requests_fail_fast_while_manager_is_down() {
    init_logging();
    let path = socket_path("down");

    // No listener at the path: every connect attempt fails.
    let (session, client) = Session::new(test_config(), UnixTransport::new(&path));
    tokio::spawn(session.run());
    client.enable().await.unwrap();

    let mut status = client.status_stream();
    timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.failures >= 2),
    )
    .await
    .expect("no connect attempts recorded")
    .expect("session task gone");

    let route = Ipv4Route {
        route_type: RouteType::Static,
        flags: 0,
        safi: Safi::Unicast,
        nexthops: None,
        ifindexes: Some(vec![3]),
        distance: None,
        metric: None,
    };
    let result = client
        .ipv4_route_add(Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 8), &route)
        .await;
    assert_eq!(result, Err(RequestError::NotConnected));

    // Once the manager comes up, the next retry connects and requests
    // succeed again.
    let listener = UnixListener::bind(&path).unwrap();
    let (mut manager, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    wait_for_state(&client, SessionState::Connected).await;
    assert_eq!(client.status().failures, 0);

    client
        .ipv4_route_add(Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 8), &route)
        .await
        .unwrap();

    let mut inbound = InboundBuffer::new();
    let messages = read_messages(&mut manager, &mut inbound, 3).await;
    assert_eq!(
        messages.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        vec![
            Command::RouterIdAdd as u16,
            Command::InterfaceAdd as u16,
            Command::Ipv4RouteAdd as u16,
        ]
    );

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn disable_tears_down_the_connection() {
    init_logging();
    let path = socket_path("disable");
    let listener = UnixListener::bind(&path).unwrap();

    let (session, client) = Session::new(test_config(), UnixTransport::new(&path));
    tokio::spawn(session.run());
    client.enable().await.unwrap();

    let (mut manager, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    wait_for_state(&client, SessionState::Connected).await;

    client.disable().await.unwrap();
    wait_for_state(&client, SessionState::Disabled).await;

    // The manager sees EOF, and no reconnect ever arrives.
    let mut chunk = [0u8; 4096];
    loop {
        let n = timeout(Duration::from_secs(5), manager.read(&mut chunk))
            .await
            .expect("timed out waiting for client close")
            .expect("read from client");
        if n == 0 {
            break;
        }
    }

    let reconnected = timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(reconnected.is_err(), "disabled session reconnected");
    assert_eq!(client.status().state, SessionState::Disabled);

    let _ = std::fs::remove_file(&path);
}
