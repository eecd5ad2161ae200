use libp2p::core::ConnectedPoint;
use libp2p::swarm::ConnectionId;
use libp2p::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ConnectionDirection {
    Inbound,
    Outbound,
}

impl From<&ConnectedPoint> for ConnectionDirection {
    fn from(endpoint: &ConnectedPoint) -> Self {
        if endpoint.is_dialer() {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeEvent {
    Connected {
        peer_id: PeerId,
        direction: ConnectionDirection,
        connection_id: ConnectionId,
    },
    Disconnected {
        peer_id: PeerId,
        direction: ConnectionDirection,
        connection_id: ConnectionId,
        cause: Option<String>,
    },
}

impl NodeEvent {
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::Connected { peer_id, .. } | Self::Disconnected { peer_id, .. } => peer_id,
        }
    }

    pub fn direction(&self) -> ConnectionDirection {
        match self {
            Self::Connected { direction, .. } | Self::Disconnected { direction, .. } => *direction,
        }
    }
}
