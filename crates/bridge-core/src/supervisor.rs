//! Backend process supervision
//!
//! Launches the backend through the platform shell, forwards its output to the
//! log, and reports its exit code. The child is killed when the monitoring task
//! is aborted or the handle is dropped.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum OutputSource {
    Stdout,
    Stderr,
}

/// A running backend process
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    command: String,
}

impl BackendProcess {
    /// Start `command` in `workdir` (or the current directory)
    pub fn spawn(command: &str, workdir: Option<&str>) -> Result<Self> {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Process(format!("Failed to start '{}': {}", command, e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, OutputSource::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, OutputSource::Stderr));
        }

        info!("Started backend process (pid {:?}): {}", child.id(), command);

        Ok(Self {
            child,
            command: command.to_string(),
        })
    }

    /// OS process id, if still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit and return its exit code
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        info!("Backend process exited with code {:?}", status.code());
        Ok(status.code())
    }

    /// Kill the process and wait for it
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        info!("Backend process stopped: {}", self.command);
        Ok(())
    }

    /// Watch the process in a background task
    ///
    /// Aborting the returned handle drops the child, which kills it.
    pub fn monitor(mut self) -> JoinHandle<Option<i32>> {
        tokio::spawn(async move {
            match self.wait().await {
                Ok(code) => code,
                Err(e) => {
                    warn!("Failed to wait for backend process: {}", e);
                    None
                }
            }
        })
    }
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

async fn forward_lines<R>(reader: R, source: OutputSource)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match source {
                OutputSource::Stdout => info!("[backend]: {}", line),
                OutputSource::Stderr => warn!("[backend error]: {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading backend {:?}: {}", source, e);
                break;
            }
        }
    }
}
