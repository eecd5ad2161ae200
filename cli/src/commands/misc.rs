use dialtest_node::{KeyKind, SecretKey};

use crate::CommandError;

#[derive(Debug, clap::Args)]
pub struct Misc {
    #[command(subcommand)]
    command: MiscCommand,
}

impl Misc {
    pub fn run(self) -> Result<(), CommandError> {
        match self.command {
            MiscCommand::P2PKeyPair(command) => command.run(),
        }
    }
}

#[derive(Clone, Debug, clap::Subcommand)]
pub enum MiscCommand {
    /// Generate a node identity, or show the peer id of an existing one.
    P2PKeyPair(P2PKeyPair),
}

#[derive(Debug, Clone, clap::Args)]
pub struct P2PKeyPair {
    #[arg(long, short = 's', env = "DIALTEST_P2P_SEC_KEY")]
    p2p_secret_key: Option<SecretKey>,

    /// Key type of a newly generated key.
    #[arg(long, default_value_t = KeyKind::Secp256k1)]
    kind: KeyKind,
}

impl P2PKeyPair {
    pub fn run(self) -> Result<(), CommandError> {
        let secret_key = self
            .p2p_secret_key
            .unwrap_or_else(|| SecretKey::generate(self.kind));
        println!("secret key: {secret_key}");
        println!("key kind:   {}", secret_key.kind());
        println!("peer_id:    {}", secret_key.peer_id());

        Ok(())
    }
}
