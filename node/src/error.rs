use libp2p::multiaddr;

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("libp2p error - can not build host: {0}")]
    Build(String),
    #[error("libp2p error - can not start host on port {port}: {reason}")]
    Listen { port: u16, reason: String },
    #[error("error while dialing peer - invalid multiaddress {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: multiaddr::Error,
    },
    #[error("error while dialing peer - no /p2p peer id in {0}")]
    MissingPeerId(String),
    #[error("error while dialing peer - connect {address}: {reason}")]
    Dial { address: String, reason: String },
    #[error("node is stopped")]
    Stopped,
}
