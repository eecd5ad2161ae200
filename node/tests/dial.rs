use std::time::{Duration, Instant};

use dialtest_node::{
    ConnectionDirection, Multiaddr, Node, NodeConfig, NodeError, NodeEvent, SecretKey,
};
use libp2p::multiaddr::Protocol;
use tokio::sync::broadcast::{self, error::RecvError};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_DELAY: Duration = Duration::from_millis(200);

fn local_config() -> NodeConfig {
    NodeConfig::new(0, SecretKey::rand())
}

fn port_of(address: &Multiaddr) -> Option<u16> {
    address.iter().find_map(|protocol| match protocol {
        Protocol::Tcp(port) => Some(port),
        _ => None,
    })
}

/// Waits for the first event accepted by `f`, `None` on timeout.
async fn wait_for_event<F>(events: &mut broadcast::Receiver<NodeEvent>, f: F) -> Option<NodeEvent>
where
    F: FnMut(&NodeEvent) -> bool,
{
    wait_for_event_within(events, EVENT_TIMEOUT, f).await
}

async fn wait_for_event_within<F>(
    events: &mut broadcast::Receiver<NodeEvent>,
    timeout: Duration,
    mut f: F,
) -> Option<NodeEvent>
where
    F: FnMut(&NodeEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if f(&event) => return Some(event),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.ok().flatten()
}

fn is_connected(event: &NodeEvent) -> bool {
    matches!(event, NodeEvent::Connected { .. })
}

fn is_disconnected(event: &NodeEvent) -> bool {
    matches!(event, NodeEvent::Disconnected { .. })
}

#[tokio::test]
async fn address_has_bound_port_and_peer_id() -> anyhow::Result<()> {
    let key = SecretKey::rand();
    let peer_id = key.peer_id();
    let node = Node::start(NodeConfig::new(0, key)).await?;

    let address = node.address();
    assert_eq!(node.peer_id(), peer_id);
    assert_ne!(port_of(&address), Some(0));
    let address = address.to_string();
    assert!(address.starts_with("/ip4/127.0.0.1/tcp/"), "{address}");
    assert!(address.ends_with(&format!("/p2p/{peer_id}")), "{address}");

    node.stop().await;
    Ok(())
}

#[tokio::test]
async fn port_in_use() -> anyhow::Result<()> {
    let node1 = Node::start(local_config()).await?;
    let port = port_of(&node1.address()).expect("tcp port");

    let err = Node::start(NodeConfig::new(port, SecretKey::rand()))
        .await
        .err()
        .expect("second listener on the same port must fail");
    assert!(matches!(err, NodeError::Listen { port: p, .. } if p == port), "{err:?}");

    node1.stop().await;
    Ok(())
}

#[tokio::test]
async fn dial_reports_directions() -> anyhow::Result<()> {
    let node1 = Node::start(local_config()).await?;
    let node2 = Node::start(local_config()).await?;
    let mut events1 = node1.subscribe();
    let mut events2 = node2.subscribe();

    node1.dial(&node2.address().to_string()).await?;

    let event = wait_for_event(&mut events1, is_connected)
        .await
        .expect("node1 should see the connection");
    assert_eq!(event.direction(), ConnectionDirection::Outbound);
    assert_eq!(*event.peer_id(), node2.peer_id());

    let event = wait_for_event(&mut events2, is_connected)
        .await
        .expect("node2 should see the connection");
    assert_eq!(event.direction(), ConnectionDirection::Inbound);
    assert_eq!(*event.peer_id(), node1.peer_id());

    // connect semantics, a second dial reuses the connection
    node1.dial(&node2.address().to_string()).await?;

    node1.stop().await;
    node2.stop().await;
    Ok(())
}

#[tokio::test]
async fn simultaneous_dial() -> anyhow::Result<()> {
    let node1 = Node::start(local_config()).await?;
    let node2 = Node::start(local_config()).await?;
    let address1 = node1.address().to_string();
    let address2 = node2.address().to_string();

    let (res1, res2) = tokio::join!(node1.dial(&address2), node2.dial(&address1));
    res1?;
    res2?;

    node1.stop().await;
    node2.stop().await;
    Ok(())
}

#[tokio::test]
async fn close_outbound_after_delay() -> anyhow::Result<()> {
    let node1 = Node::start(
        local_config()
            .with_close_outbound(true)
            .with_close_conn_time(CLOSE_DELAY),
    )
    .await?;
    let node2 = Node::start(local_config()).await?;
    let mut events1 = node1.subscribe();
    let mut events2 = node2.subscribe();

    let dialed_at = Instant::now();
    node1.dial(&node2.address().to_string()).await?;

    let event = wait_for_event(&mut events1, is_disconnected)
        .await
        .expect("outbound connection should be closed by node1");
    assert!(dialed_at.elapsed() >= CLOSE_DELAY, "{:?}", dialed_at.elapsed());
    assert_eq!(event.direction(), ConnectionDirection::Outbound);

    let event = wait_for_event(&mut events2, is_disconnected)
        .await
        .expect("node2 should notice the close");
    assert_eq!(event.direction(), ConnectionDirection::Inbound);
    assert_eq!(*event.peer_id(), node1.peer_id());

    node1.stop().await;
    node2.stop().await;
    Ok(())
}

#[tokio::test]
async fn close_inbound_after_delay() -> anyhow::Result<()> {
    let node1 = Node::start(local_config()).await?;
    let node2 = Node::start(
        local_config()
            .with_close_inbound(true)
            .with_close_conn_time(CLOSE_DELAY),
    )
    .await?;
    let mut events1 = node1.subscribe();
    let mut events2 = node2.subscribe();

    node1.dial(&node2.address().to_string()).await?;

    wait_for_event(&mut events2, is_connected)
        .await
        .expect("node2 should accept the connection");
    let connected_at = Instant::now();
    // nothing is closed before the delay is over
    let early = wait_for_event_within(&mut events1, CLOSE_DELAY / 2, is_disconnected).await;
    assert!(early.is_none(), "{early:?}");

    let event = wait_for_event(&mut events1, is_disconnected)
        .await
        .expect("node2 should close the inbound connection");
    assert!(connected_at.elapsed() >= CLOSE_DELAY / 2, "{:?}", connected_at.elapsed());
    assert_eq!(event.direction(), ConnectionDirection::Outbound);
    assert_eq!(*event.peer_id(), node2.peer_id());

    node1.stop().await;
    node2.stop().await;
    Ok(())
}

#[tokio::test]
async fn close_flags_only_apply_to_their_direction() -> anyhow::Result<()> {
    let node1 = Node::start(
        local_config()
            .with_close_inbound(true)
            .with_close_conn_time(CLOSE_DELAY),
    )
    .await?;
    let node2 = Node::start(
        local_config()
            .with_close_outbound(true)
            .with_close_conn_time(CLOSE_DELAY),
    )
    .await?;
    let mut events1 = node1.subscribe();
    let mut events2 = node2.subscribe();

    // outbound for node1, inbound for node2: neither flag matches
    node1.dial(&node2.address().to_string()).await?;

    let event = wait_for_event_within(&mut events1, CLOSE_DELAY * 3, is_disconnected).await;
    assert!(event.is_none(), "{event:?}");
    let event = wait_for_event_within(&mut events2, CLOSE_DELAY, is_disconnected).await;
    assert!(event.is_none(), "{event:?}");

    node1.stop().await;
    node2.stop().await;
    Ok(())
}

#[tokio::test]
async fn connection_stays_open_without_close_flags() -> anyhow::Result<()> {
    let node1 = Node::start(local_config().with_close_conn_time(CLOSE_DELAY)).await?;
    let node2 = Node::start(local_config().with_close_conn_time(CLOSE_DELAY)).await?;
    let mut events1 = node1.subscribe();

    node1.dial(&node2.address().to_string()).await?;

    let event = wait_for_event_within(&mut events1, CLOSE_DELAY * 3, is_disconnected).await;
    assert!(event.is_none(), "{event:?}");

    node1.stop().await;
    node2.stop().await;
    Ok(())
}

#[tokio::test]
async fn stopped_peer_disconnects() -> anyhow::Result<()> {
    let node1 = Node::start(local_config()).await?;
    let node2 = Node::start(local_config()).await?;
    let mut events1 = node1.subscribe();

    node1.dial(&node2.address().to_string()).await?;
    node2.stop().await;

    wait_for_event(&mut events1, is_disconnected)
        .await
        .expect("connection should go away with the peer");

    node1.stop().await;
    Ok(())
}

#[tokio::test]
async fn dial_closed_port() -> anyhow::Result<()> {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };
    let node = Node::start(local_config()).await?;
    let peer_id = SecretKey::rand().peer_id();

    let err = node
        .dial(&format!("/ip4/127.0.0.1/tcp/{port}/p2p/{peer_id}"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Dial { .. }), "{err:?}");

    node.stop().await;
    Ok(())
}

#[tokio::test]
async fn dial_wrong_peer_id() -> anyhow::Result<()> {
    let node1 = Node::start(local_config()).await?;
    let node2 = Node::start(local_config()).await?;
    let port = port_of(&node2.address()).expect("tcp port");
    let impostor = SecretKey::rand().peer_id();

    let err = node1
        .dial(&format!("/ip4/127.0.0.1/tcp/{port}/p2p/{impostor}"))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Dial { .. }), "{err:?}");

    node1.stop().await;
    node2.stop().await;
    Ok(())
}
