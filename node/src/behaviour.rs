use libp2p::identity::Keypair;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, ping};

pub const IDENTIFY_PROTOCOL_VERSION: &str = "/dialtest/1.0.0";

#[derive(NetworkBehaviour)]
pub struct Behaviour {
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
}

impl Behaviour {
    pub fn new(local_key: &Keypair) -> Self {
        let identify = identify::Behaviour::new(identify::Config::new(
            IDENTIFY_PROTOCOL_VERSION.to_owned(),
            local_key.public(),
        ));
        Self {
            identify,
            ping: ping::Behaviour::default(),
        }
    }
}
