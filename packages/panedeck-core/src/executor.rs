//! One-shot tmux invocations.
//!
//! Each call runs a fresh process to completion and returns its stdout. Used
//! by the one-shot transport and for session operations that happen outside
//! the bus (switching, creating, renaming, killing).

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};
use crate::DEFAULT_TMUX_PROGRAM;

/// Run `program` with `args` and return its stdout.
///
/// A spawn failure or a non-zero exit is an error carrying stderr.
pub fn execute_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| Error::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let mut command = program.to_string();
        for arg in args {
            command.push(' ');
            command.push_str(&arg.as_ref().to_string_lossy());
        }
        return Err(Error::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn execute_tmux_command(args: &[&str]) -> Result<String> {
    execute_command(DEFAULT_TMUX_PROGRAM, args)
}

/// Create a detached session starting in `directory`.
pub fn create_session(name: &str, directory: &Path) -> Result<()> {
    let directory = directory.to_string_lossy();
    execute_tmux_command(&["new-session", "-d", "-s", name, "-c", &directory])?;
    Ok(())
}

/// Create a detached window at the end of `session_name`.
pub fn create_window(session_name: &str, name: &str, directory: &Path) -> Result<()> {
    let directory = directory.to_string_lossy();
    let target = format!("{}:", session_name);
    execute_tmux_command(&["new-window", "-d", "-n", name, "-c", &directory, "-t", &target])?;
    Ok(())
}

/// Move the attached client to a session, window or pane.
pub fn switch_client(target: &str) -> Result<()> {
    execute_tmux_command(&["switch-client", "-t", target])?;
    Ok(())
}

pub fn kill_session(session_id: &str) -> Result<()> {
    execute_tmux_command(&["kill-session", "-t", session_id])?;
    Ok(())
}

pub fn kill_window(window_id: &str) -> Result<()> {
    execute_tmux_command(&["kill-window", "-t", window_id])?;
    Ok(())
}

pub fn rename_session(session_id: &str, new_name: &str) -> Result<()> {
    execute_tmux_command(&["rename-session", "-t", session_id, new_name])?;
    Ok(())
}

pub fn rename_window(window_id: &str, new_name: &str) -> Result<()> {
    execute_tmux_command(&["rename-window", "-t", window_id, new_name])?;
    Ok(())
}
