use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use ::tracing::{debug, error, info};
use anyhow::Context;
use dialtest_node::tracing::Level;
use dialtest_node::{parse_dial_address, tracing, PeerId, SecretKey};

mod process;
pub use process::ExecError;

/// Start two nodes that dial each other and print what both of them logged.
#[derive(Debug, clap::Args)]
pub struct Launch {
    /// Executable of the nodes, must provide the `node` command.
    /// Defaults to the running executable.
    #[arg(long, env = "DIALTEST_EXECUTABLE")]
    pub executable: Option<PathBuf>,

    #[arg(long, default_value_t = 10000)]
    pub port1: u16,

    #[arg(long, default_value_t = 10001)]
    pub port2: u16,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1010ms")]
    pub dial_after1: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1000ms")]
    pub dial_after2: Duration,

    /// How long both nodes keep running after their dial.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "4s")]
    pub time_to_live: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub close_conn_time: Duration,

    #[arg(long)]
    pub close_inbound1: bool,

    #[arg(long)]
    pub close_outbound1: bool,

    #[arg(long)]
    pub close_inbound2: bool,

    #[arg(long)]
    pub close_outbound2: bool,

    /// Verbosity level
    #[arg(long, short, env = "DIALTEST_VERBOSITY", default_value = "info")]
    pub verbosity: Level,
}

/// Arguments of a `node` process that dials a peer.
#[derive(Debug, Clone)]
pub struct DialParams {
    pub port: u16,
    pub secret_key: String,
    pub dial_address: String,
    pub dial_after: Duration,
    pub time_to_live: Duration,
    pub close_conn_time: Duration,
    pub close_inbound: bool,
    pub close_outbound: bool,
    pub verbosity: Level,
}

impl DialParams {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--port={}", self.port),
            format!("--pk={}", self.secret_key),
            format!("--dial={}", self.dial_address),
            format!("--dial-after={}", humantime::format_duration(self.dial_after)),
            format!(
                "--time-to-live={}",
                humantime::format_duration(self.time_to_live)
            ),
            format!(
                "--close-conn-time={}",
                humantime::format_duration(self.close_conn_time)
            ),
            format!("--verbosity={}", self.verbosity),
        ];
        if self.close_inbound {
            args.push("--close-inbound".to_owned());
        }
        if self.close_outbound {
            args.push("--close-outbound".to_owned());
        }
        args
    }
}

struct Launcher {
    executable: PathBuf,
}

impl Launcher {
    fn node_command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("node");
        cmd
    }

    fn address(&self, port: u16, secret_key: &str) -> Result<String, ExecError> {
        let mut cmd = self.node_command();
        cmd.arg(format!("--port={port}"))
            .arg(format!("--pk={secret_key}"))
            .arg("--print-address");
        debug!(port, "querying node address");
        process::execute(cmd).map(|address| address.trim().to_owned())
    }

    fn dial(&self, params: &DialParams) -> Result<String, ExecError> {
        let mut cmd = self.node_command();
        cmd.args(params.args());
        debug!(port = params.port, dial = %params.dial_address, "starting node");
        process::execute(cmd)
    }
}

/// One node's report: a blank line, the header, then its output.
fn format_output(peer_id: &PeerId, result: &Result<String, ExecError>) -> String {
    let mut report = format!("\n{peer_id} output: \n");
    match result {
        Ok(output) => report.push_str(output),
        Err(err) => {
            report.push_str(err.stdout());
            if !report.ends_with('\n') {
                report.push('\n');
            }
            report.push_str(&format!("{err}\n"));
        }
    }
    report
}

fn write_report<W: Write>(mut out: W, report: &str) -> std::io::Result<()> {
    out.write_all(report.as_bytes())?;
    out.flush()
}

impl Launch {
    pub fn run(self) -> anyhow::Result<()> {
        tracing::initialize(self.verbosity).context("failed to initialize logging")?;

        let executable = match self.executable {
            Some(executable) => executable,
            None => std::env::current_exe().context("failed to locate the current executable")?,
        };
        let launcher = Launcher { executable };

        let secret_key1 = SecretKey::rand().to_string();
        let secret_key2 = SecretKey::rand().to_string();

        let address1 = launcher
            .address(self.port1, &secret_key1)
            .context("failed to query the address of the first node")?;
        let address2 = launcher
            .address(self.port2, &secret_key2)
            .context("failed to query the address of the second node")?;
        let (peer_id1, _) = parse_dial_address(&address1)?;
        let (peer_id2, _) = parse_dial_address(&address2)?;
        info!(%address1, %address2, "nodes are ready");

        let nodes = [
            (
                peer_id1,
                DialParams {
                    port: self.port1,
                    secret_key: secret_key1,
                    dial_address: address2,
                    dial_after: self.dial_after1,
                    time_to_live: self.time_to_live,
                    close_conn_time: self.close_conn_time,
                    close_inbound: self.close_inbound1,
                    close_outbound: self.close_outbound1,
                    verbosity: self.verbosity,
                },
            ),
            (
                peer_id2,
                DialParams {
                    port: self.port2,
                    secret_key: secret_key2,
                    dial_address: address1,
                    dial_after: self.dial_after2,
                    time_to_live: self.time_to_live,
                    close_conn_time: self.close_conn_time,
                    close_inbound: self.close_inbound2,
                    close_outbound: self.close_outbound2,
                    verbosity: self.verbosity,
                },
            ),
        ];

        let launcher = &launcher;
        let failed = thread::scope(|s| {
            let handles = nodes
                .iter()
                .map(|(peer_id, params)| {
                    s.spawn(move || {
                        let result = launcher.dial(params);
                        let report = format_output(peer_id, &result);
                        match write_report(std::io::stdout().lock(), &report) {
                            Ok(()) => result.is_err(),
                            Err(err) => {
                                error!(%peer_id, "failed to print node output: {err}");
                                true
                            }
                        }
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(true))
                .filter(|failed| *failed)
                .count()
        });

        if failed > 0 {
            anyhow::bail!("{failed} of {} nodes failed", nodes.len());
        }
        Ok(())
    }
}
