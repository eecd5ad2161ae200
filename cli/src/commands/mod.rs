pub mod launch;
pub mod misc;
pub mod node;

pub type CommandError = anyhow::Error;

#[derive(Debug, clap::Parser)]
#[command(name = "dialtest", about = "Libp2p dial problem reproduction harness")]
pub struct DialtestCli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    Node(node::Node),
    Launch(launch::Launch),
    /// Miscellaneous utilities.
    Misc(misc::Misc),
}

impl Command {
    pub fn run(self) -> Result<(), crate::CommandError> {
        match self {
            Self::Node(v) => v.run(),
            Self::Launch(v) => v.run(),
            Self::Misc(v) => v.run(),
        }
    }
}
