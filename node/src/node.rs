use std::collections::HashMap;
use std::time::Duration;

use libp2p::futures::StreamExt;
use libp2p::multiaddr::{Multiaddr, Protocol};
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{ConnectionId, SwarmEvent};
use libp2p::{identify, noise, ping, tcp, yamux, PeerId, Swarm, SwarmBuilder};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::behaviour::{Behaviour, BehaviourEvent};
use crate::{ConnectionDirection, NodeConfig, NodeError, NodeEvent};

/// Connections must outlive the harness run, closing them is up to the
/// close policy.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DIAL_TIMEOUT: Duration = Duration::from_secs(20);
const EVENTS_CAPACITY: usize = 64;

type DialReply = oneshot::Sender<Result<(), String>>;

#[derive(Debug)]
enum Cmd {
    Dial {
        peer_id: PeerId,
        address: Multiaddr,
        reply: DialReply,
    },
    Stop,
}

#[derive(Debug)]
struct PendingClose {
    peer_id: PeerId,
    direction: ConnectionDirection,
    connection_id: ConnectionId,
}

/// A libp2p host listening on a single loopback address.
///
/// The swarm itself runs on a spawned task, the handle only talks to it
/// through a command channel. Dropping the handle stops the task.
pub struct Node {
    peer_id: PeerId,
    listen_addr: Multiaddr,
    cmd_sender: mpsc::UnboundedSender<Cmd>,
    event_sender: broadcast::Sender<NodeEvent>,
    task: JoinHandle<()>,
}

impl Node {
    /// Builds the host and waits until it is listening.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let local_key = config.secret_key.keypair().clone();
        let peer_id = local_key.public().to_peer_id();
        let port = config.port;

        let mut swarm = SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|err| NodeError::Build(err.to_string()))?
            .with_behaviour(Behaviour::new)
            .map_err(|err| NodeError::Build(err.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
            .build();

        let listener_id = swarm
            .listen_on(config.listen_addr())
            .map_err(|err| NodeError::Listen {
                port,
                reason: err.to_string(),
            })?;
        let listen_addr = loop {
            match swarm.select_next_some().await {
                SwarmEvent::NewListenAddr {
                    listener_id: id,
                    address,
                } if id == listener_id => break address,
                SwarmEvent::ListenerError {
                    listener_id: id,
                    error,
                } if id == listener_id => {
                    return Err(NodeError::Listen {
                        port,
                        reason: error.to_string(),
                    });
                }
                SwarmEvent::ListenerClosed {
                    listener_id: id,
                    reason,
                    ..
                } if id == listener_id => {
                    let reason = match reason {
                        Ok(()) => "listener closed".to_owned(),
                        Err(err) => err.to_string(),
                    };
                    return Err(NodeError::Listen { port, reason });
                }
                _ => {}
            }
        };
        debug!(%peer_id, %listen_addr, "listening");

        let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel();
        let (close_sender, close_receiver) = mpsc::unbounded_channel();
        let (event_sender, _) = broadcast::channel(EVENTS_CAPACITY);

        let event_loop = EventLoop {
            swarm,
            config,
            cmd_receiver,
            close_sender,
            close_receiver,
            event_sender: event_sender.clone(),
            pending_dials: HashMap::new(),
        };
        let task = tokio::spawn(event_loop.run());

        Ok(Self {
            peer_id,
            listen_addr,
            cmd_sender,
            event_sender,
            task,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// `/ip4/127.0.0.1/tcp/<port>/p2p/<peer_id>`
    pub fn address(&self) -> Multiaddr {
        self.listen_addr.clone().with(Protocol::P2p(self.peer_id))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_sender.subscribe()
    }

    /// Connects to the peer at `address`, which must end with `/p2p/<peer_id>`.
    ///
    /// Returns as soon as any connection to that peer exists.
    pub async fn dial(&self, address: &str) -> Result<(), NodeError> {
        let (peer_id, transport_addr) = parse_dial_address(address)?;
        let (reply, response) = oneshot::channel();
        self.cmd_sender
            .send(Cmd::Dial {
                peer_id,
                address: transport_addr,
                reply,
            })
            .map_err(|_| NodeError::Stopped)?;

        let result = tokio::time::timeout(DIAL_TIMEOUT, response)
            .await
            .map_err(|_| NodeError::Dial {
                address: address.to_owned(),
                reason: format!("timed out after {DIAL_TIMEOUT:?}"),
            })?
            .map_err(|_| NodeError::Stopped)?;
        result.map_err(|reason| NodeError::Dial {
            address: address.to_owned(),
            reason,
        })
    }

    pub async fn stop(self) {
        let _ = self.cmd_sender.send(Cmd::Stop);
        if let Err(err) = self.task.await {
            warn!(peer_id = %self.peer_id, "node event loop failed: {err}");
        }
    }
}

/// Splits a `.../p2p/<peer_id>` multiaddress into the peer id and the
/// transport address.
pub fn parse_dial_address(address: &str) -> Result<(PeerId, Multiaddr), NodeError> {
    let mut addr: Multiaddr = address
        .parse()
        .map_err(|source| NodeError::InvalidAddress {
            address: address.to_owned(),
            source,
        })?;
    match addr.pop() {
        Some(Protocol::P2p(peer_id)) => Ok((peer_id, addr)),
        _ => Err(NodeError::MissingPeerId(address.to_owned())),
    }
}

struct EventLoop {
    swarm: Swarm<Behaviour>,
    config: NodeConfig,
    cmd_receiver: mpsc::UnboundedReceiver<Cmd>,
    close_sender: mpsc::UnboundedSender<PendingClose>,
    close_receiver: mpsc::UnboundedReceiver<PendingClose>,
    event_sender: broadcast::Sender<NodeEvent>,
    pending_dials: HashMap<ConnectionId, DialReply>,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_event(event),
                cmd = self.cmd_receiver.recv() => match cmd {
                    Some(Cmd::Dial { peer_id, address, reply }) => self.dial(peer_id, address, reply),
                    Some(Cmd::Stop) | None => break,
                },
                Some(close) = self.close_receiver.recv() => self.close_connection(close),
            }
        }
        debug!(peer_id = %self.swarm.local_peer_id(), "node stopped");
    }

    fn dial(&mut self, peer_id: PeerId, address: Multiaddr, reply: DialReply) {
        if self.swarm.is_connected(&peer_id) {
            debug!(%peer_id, "already connected, nothing to dial");
            let _ = reply.send(Ok(()));
            return;
        }

        let opts = DialOpts::peer_id(peer_id).addresses(vec![address]).build();
        let connection_id = opts.connection_id();
        match self.swarm.dial(opts) {
            Ok(()) => {
                self.pending_dials.insert(connection_id, reply);
            }
            Err(err) => {
                let _ = reply.send(Err(err.to_string()));
            }
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                endpoint,
                ..
            } => {
                let direction = ConnectionDirection::from(&endpoint);
                info!(%peer_id, %direction, ?connection_id, "connection established");

                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(()));
                }
                let _ = self.event_sender.send(NodeEvent::Connected {
                    peer_id,
                    direction,
                    connection_id,
                });

                if let Some(delay) = self.config.close_after(direction) {
                    info!(%peer_id, %direction, ?connection_id, ?delay, "connection will be closed");
                    let close_sender = self.close_sender.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = close_sender.send(PendingClose {
                            peer_id,
                            direction,
                            connection_id,
                        });
                    });
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                connection_id,
                endpoint,
                cause,
                ..
            } => {
                let direction = ConnectionDirection::from(&endpoint);
                let cause = cause.map(|err| err.to_string());
                info!(
                    %peer_id,
                    %direction,
                    ?connection_id,
                    cause = cause.as_deref().unwrap_or("none"),
                    "connection closed"
                );
                let _ = self.event_sender.send(NodeEvent::Disconnected {
                    peer_id,
                    direction,
                    connection_id,
                    cause,
                });
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
            } => {
                warn!(?peer_id, ?connection_id, %error, "outgoing connection failed");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(error.to_string()));
                }
            }
            SwarmEvent::IncomingConnectionError {
                send_back_addr,
                error,
                ..
            } => {
                warn!(%send_back_addr, %error, "incoming connection failed");
            }
            SwarmEvent::ListenerClosed {
                addresses, reason, ..
            } => {
                warn!(?addresses, ?reason, "listener closed");
            }
            SwarmEvent::Behaviour(BehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(
                    %peer_id,
                    agent_version = %info.agent_version,
                    protocol_version = %info.protocol_version,
                    "identified peer"
                );
            }
            SwarmEvent::Behaviour(BehaviourEvent::Ping(ping::Event { peer, result, .. })) => {
                match result {
                    Ok(rtt) => trace!(peer_id = %peer, ?rtt, "ping"),
                    Err(err) => debug!(peer_id = %peer, %err, "ping failed"),
                }
            }
            _ => {}
        }
    }

    fn close_connection(&mut self, close: PendingClose) {
        let PendingClose {
            peer_id,
            direction,
            connection_id,
        } = close;
        if self.swarm.close_connection(connection_id) {
            info!(%peer_id, %direction, ?connection_id, "closing connection");
        } else {
            debug!(%peer_id, %direction, ?connection_id, "connection is already closed");
        }
    }
}
