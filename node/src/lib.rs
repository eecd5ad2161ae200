#![forbid(unsafe_code)]

pub mod identity;
pub use identity::{KeyKind, SecretKey, SecretKeyFromStrError};

pub mod config;
pub use config::NodeConfig;

mod behaviour;

mod event;
pub use event::{ConnectionDirection, NodeEvent};

mod error;
pub use error::NodeError;

mod node;
pub use node::{parse_dial_address, Node};

pub mod tracing;

pub use libp2p::{Multiaddr, PeerId};
