//! Connection manager for tmux control mode
//!
//! Handles spawning the `tmux -C attach` process and handing its pipes to the
//! engine.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{Error, Result};

/// How long [`ControlModeConnection::shutdown`] waits for tmux to exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(3000);

/// A running `tmux -C` client
pub struct ControlModeConnection {
    /// The tmux -C child process
    child: Child,

    /// Stdin for sending commands, taken by [`ControlModeConnection::take_io`]
    stdin: Option<ChildStdin>,

    /// Stdout carrying response blocks and notifications
    stdout: Option<ChildStdout>,
}

impl ControlModeConnection {
    /// Attach to the most recent tmux session in control mode.
    ///
    /// Plain `-C` (not `-CC`) needs no PTY, so tmux runs with piped stdio.
    pub fn attach(program: &str) -> Result<Self> {
        let mut child = Command::new(program)
            .args(["-C", "attach"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    /// Take the command writer and the line reader.
    ///
    /// Returns `None` if the pipes were already taken.
    pub fn take_io(&mut self) -> Option<(ChildStdin, BufReader<ChildStdout>)> {
        let stdin = self.stdin.take()?;
        let stdout = self.stdout.take()?;
        Some((stdin, BufReader::new(stdout)))
    }

    /// Check if the process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for tmux to exit after its stdin has been closed.
    ///
    /// Closing stdin makes a control client detach on its own. The process is
    /// only killed if it is still around after the timeout.
    pub async fn shutdown(mut self) {
        drop(self.stdin.take());

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "control mode client exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for control mode client");
            }
            Err(_) => {
                tracing::warn!("control mode client did not exit, killing it");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "failed to kill control mode client");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_missing_program() {
        let err = match ControlModeConnection::attach("/nonexistent/panedeck-tmux") {
            Ok(_) => panic!("Expected spawn failure"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Spawn { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::External);
    }

    #[tokio::test]
    async fn test_take_io_once() {
        // `true` ignores the control mode arguments and exits
        let mut connection = ControlModeConnection::attach("true").unwrap();
        assert!(connection.take_io().is_some());
        assert!(connection.take_io().is_none());
        connection.shutdown().await;
    }
}
