use std::io::Write;
use std::time::Duration;

use ::tracing::{error, info};
use anyhow::Context;
use dialtest_node::tracing::Level;
use dialtest_node::{tracing, NodeConfig, SecretKey, SecretKeyFromStrError};

/// Run a single node that either prints its address or dials a peer.
#[derive(Debug, clap::Args)]
pub struct Node {
    /// Port to listen on, on 127.0.0.1.
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Hex encoded libp2p private key.
    #[arg(long = "pk", env = "DIALTEST_P2P_SEC_KEY")]
    pub p2p_secret_key: Option<String>,

    /// Multiaddress of the peer to dial, including its `/p2p/<peer_id>`.
    #[arg(long)]
    pub dial: Option<String>,

    /// Time to wait after start before dialing, e.g. `1010ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub dial_after: Option<Duration>,

    /// Time to keep running after the dial, e.g. `4s`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub time_to_live: Option<Duration>,

    /// Delay between establishing a connection and force-closing it.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub close_conn_time: Duration,

    /// Close inbound connections `close-conn-time` after they are established.
    #[arg(long)]
    pub close_inbound: bool,

    /// Close outbound connections `close-conn-time` after they are established.
    #[arg(long)]
    pub close_outbound: bool,

    /// Print the node's multiaddress and exit.
    #[arg(long)]
    pub print_address: bool,

    /// Verbosity level
    #[arg(long, short, env = "DIALTEST_VERBOSITY", default_value = "info")]
    pub verbosity: Level,
}

#[derive(thiserror::Error, Debug)]
pub enum NodeArgsError {
    #[error("port is not defined")]
    PortNotDefined,
    #[error("private key is not specified")]
    SecretKeyNotSpecified,
    #[error("dial after not specified")]
    DialAfterNotSpecified,
    #[error("time to live not specified")]
    TimeToLiveNotSpecified,
    #[error("dial address not specified")]
    DialAddressNotSpecified,
    #[error("invalid private key: {0}")]
    InvalidSecretKey(#[from] SecretKeyFromStrError),
}

#[derive(Debug, PartialEq, Eq)]
enum Plan {
    PrintAddress,
    Dial {
        address: String,
        dial_after: Duration,
        time_to_live: Duration,
    },
}

impl Node {
    fn validate(self) -> Result<(NodeConfig, Plan), NodeArgsError> {
        if self.port == 0 {
            return Err(NodeArgsError::PortNotDefined);
        }
        let secret_key = self
            .p2p_secret_key
            .filter(|key| !key.is_empty())
            .ok_or(NodeArgsError::SecretKeyNotSpecified)?;

        let timings = if self.print_address {
            None
        } else {
            let dial_after = self
                .dial_after
                .filter(|d| !d.is_zero())
                .ok_or(NodeArgsError::DialAfterNotSpecified)?;
            let time_to_live = self
                .time_to_live
                .filter(|d| !d.is_zero())
                .ok_or(NodeArgsError::TimeToLiveNotSpecified)?;
            Some((dial_after, time_to_live))
        };

        let secret_key: SecretKey = secret_key.parse()?;

        let plan = match timings {
            None => Plan::PrintAddress,
            Some((dial_after, time_to_live)) => {
                let address = self
                    .dial
                    .filter(|address| !address.is_empty())
                    .ok_or(NodeArgsError::DialAddressNotSpecified)?;
                Plan::Dial {
                    address,
                    dial_after,
                    time_to_live,
                }
            }
        };

        let config = NodeConfig::new(self.port, secret_key)
            .with_close_inbound(self.close_inbound)
            .with_close_outbound(self.close_outbound)
            .with_close_conn_time(self.close_conn_time);
        Ok((config, plan))
    }

    pub fn run(self) -> anyhow::Result<()> {
        // with --print-address stdout must carry nothing but the address
        let max_log_level = if self.print_address {
            self.verbosity.min(Level::ERROR)
        } else {
            self.verbosity
        };
        let (config, plan) = self.validate()?;
        tracing::initialize(max_log_level).context("failed to initialize logging")?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to initialize tokio runtime")?;
        runtime.block_on(run_node(config, plan))
    }
}

async fn run_node(config: NodeConfig, plan: Plan) -> anyhow::Result<()> {
    let node = dialtest_node::Node::start(config).await?;

    match plan {
        Plan::PrintAddress => {
            {
                let mut stdout = std::io::stdout().lock();
                write!(stdout, "{}", node.address())?;
                stdout.flush()?;
            }
            node.stop().await;
            Ok(())
        }
        Plan::Dial {
            address,
            dial_after,
            time_to_live,
        } => {
            info!(peer_id = %node.peer_id(), "started");
            tokio::time::sleep(dial_after).await;

            info!(%address, "dialing");
            let result = node.dial(&address).await;
            if let Err(err) = &result {
                error!("{err}");
            }

            tokio::time::sleep(time_to_live).await;
            info!("finished");
            node.stop().await;
            result?;
            Ok(())
        }
    }
}
