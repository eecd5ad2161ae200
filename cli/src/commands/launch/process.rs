use std::process::{Command, ExitStatus, Output};

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
}

impl ExecError {
    /// Whatever the process printed to stdout before failing.
    pub fn stdout(&self) -> &str {
        match self {
            Self::Spawn { .. } => "",
            Self::Failed { stdout, .. } => stdout,
        }
    }
}

/// Runs `cmd` to completion and returns its stdout.
///
/// A non-zero exit status or any output on stderr counts as a failure.
pub fn execute(mut cmd: Command) -> Result<String, ExecError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let Output {
        status,
        stdout,
        stderr,
    } = cmd.output().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr);
    if !status.success() || !stderr.is_empty() {
        return Err(ExecError::Failed {
            program,
            status,
            stdout,
            stderr: stderr.trim_end().to_owned(),
        });
    }
    Ok(stdout)
}
