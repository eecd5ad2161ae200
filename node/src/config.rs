use std::net::Ipv4Addr;
use std::time::Duration;

use libp2p::multiaddr::{Multiaddr, Protocol};

use crate::{ConnectionDirection, SecretKey};

pub const LISTEN_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Delay between a connection being established and the forced close,
/// when closing is enabled for its direction.
pub const DEFAULT_CLOSE_CONN_TIME: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port to listen on, `0` lets the OS pick one.
    pub port: u16,
    pub secret_key: SecretKey,
    /// Close every inbound connection `close_conn_time` after it is established.
    pub close_inbound: bool,
    /// Close every outbound connection `close_conn_time` after it is established.
    pub close_outbound: bool,
    pub close_conn_time: Duration,
}

impl NodeConfig {
    pub fn new(port: u16, secret_key: SecretKey) -> Self {
        Self {
            port,
            secret_key,
            close_inbound: false,
            close_outbound: false,
            close_conn_time: DEFAULT_CLOSE_CONN_TIME,
        }
    }

    pub fn with_close_inbound(mut self, close: bool) -> Self {
        self.close_inbound = close;
        self
    }

    pub fn with_close_outbound(mut self, close: bool) -> Self {
        self.close_outbound = close;
        self
    }

    pub fn with_close_conn_time(mut self, delay: Duration) -> Self {
        self.close_conn_time = delay;
        self
    }

    pub fn listen_addr(&self) -> Multiaddr {
        Multiaddr::empty()
            .with(Protocol::Ip4(LISTEN_IP))
            .with(Protocol::Tcp(self.port))
    }

    /// How long to keep a freshly established connection before closing it,
    /// `None` if connections in this direction are left alone.
    pub fn close_after(&self, direction: ConnectionDirection) -> Option<Duration> {
        let close = match direction {
            ConnectionDirection::Inbound => self.close_inbound,
            ConnectionDirection::Outbound => self.close_outbound,
        };
        close.then_some(self.close_conn_time)
    }
}
