//! tmux operations issued by the transports.
//!
//! A [`Command`] is an immutable request. Completing it consumes the request
//! and produces a [`CommandResult`], so an in-flight command can only ever be
//! owned by the single round trip carrying it.

use crate::error::{Error, Result};
use crate::session::{self, Session};

/// Format of one line of the list-tree report, see [`session::parse_sessions`]
const LIST_TREE_FORMAT: &str = concat!(
    "#{session_name}|#{window_name}|#{pane_current_command}|",
    "#{window_index}.#{pane_index}|",
    "#{session_attached}.#{window_active}.#{pane_active}|",
    "#{session_last_attached}|",
    "#{session_id}.#{window_id}.#{pane_id}"
);

const CURRENT_WINDOW_FORMAT: &str = "#{session_id}.#{window_id}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Capture a pane's visible contents, escape sequences included
    CapturePane { pane_id: String },
    /// List every pane of every session
    ListTree,
    /// Query the session and window of the attached client
    CurrentWindow,
}

/// A completed [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    CapturedPane { pane_id: String, snapshot: String },
    ListedTree { sessions: Vec<Session> },
    CurrentWindow { session_id: String, window_id: String },
}

impl Command {
    /// Render the command line.
    ///
    /// The escaped form quotes format strings for tmux's own command parser
    /// (control mode); the raw form is meant to be split into process
    /// arguments.
    pub fn command_line(&self, escaped: bool) -> String {
        match self {
            Command::CapturePane { pane_id } => format!("capture-pane -p -e -t {}", pane_id),
            Command::ListTree => format_command("list-panes -a -F", LIST_TREE_FORMAT, escaped),
            Command::CurrentWindow => {
                format_command("display-message -p -F", CURRENT_WINDOW_FORMAT, escaped)
            }
        }
    }

    /// Process arguments for a one-shot invocation
    pub fn args(&self) -> Vec<String> {
        self.command_line(false)
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::CapturePane { .. } => "capture-pane",
            Command::ListTree => "list-tree",
            Command::CurrentWindow => "current-window",
        }
    }

    /// Turn the raw output of this command into its result.
    pub fn complete(self, output: &str) -> Result<CommandResult> {
        match self {
            Command::CapturePane { pane_id } => Ok(CommandResult::CapturedPane {
                pane_id,
                snapshot: output.to_string(),
            }),
            Command::ListTree => Ok(CommandResult::ListedTree {
                sessions: session::parse_sessions(output)?,
            }),
            Command::CurrentWindow => {
                let line = output.strip_suffix('\n').unwrap_or(output);
                match line.split('.').collect::<Vec<_>>().as_slice() {
                    [session_id, window_id] => Ok(CommandResult::CurrentWindow {
                        session_id: session_id.to_string(),
                        window_id: window_id.to_string(),
                    }),
                    parts => Err(Error::malformed(
                        "current window",
                        format!("expected 2 ids in {:?}, got {}", line, parts.len()),
                    )),
                }
            }
        }
    }
}

fn format_command(prefix: &str, format: &str, escaped: bool) -> String {
    if escaped {
        format!("{} \"{}\"", prefix, format)
    } else {
        format!("{} {}", prefix, format)
    }
}
