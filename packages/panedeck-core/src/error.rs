//! Error taxonomy shared by every worker.
//!
//! All errors end the worker that hit them. [`ErrorKind`] separates defects in
//! our own conversion layer or wire-format assumptions from failures of the
//! external tmux process, so the binary can report them differently.

use std::io;

use crate::event::EventType;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programming defect or wire-format drift
    Invariant,
    /// tmux could not be spawned, exited, or failed a command
    External,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An event reached a transport that has no command for it
    #[error("no tmux command handles {0} events")]
    Unroutable(EventType),

    /// A rendered command line would break the line-oriented protocol
    #[error("malformed command line: {0:?}")]
    MalformedCommand(String),

    /// A result payload did not have the shape its command expects
    #[error("malformed {what} payload: {detail}")]
    MalformedPayload { what: &'static str, detail: String },

    /// A result block completed while no command was waiting for one
    #[error("result block arrived with no command awaiting it")]
    Uncorrelated,

    /// A queue between workers closed while the sender still needed it
    #[error("{0} queue closed")]
    QueueClosed(&'static str),

    /// A transport was started before the bus gave it somewhere to emit
    #[error("{0} started before being registered as a producer")]
    Unregistered(&'static str),

    #[error("worker {name} panicked: {message}")]
    WorkerPanicked { name: &'static str, message: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A one-shot tmux invocation exited unsuccessfully
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// tmux answered a control mode command with an `%error` block
    #[error("tmux rejected `{command}`: {message}")]
    Rejected { command: String, message: String },

    #[error("failed to write to tmux: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read from tmux: {0}")]
    Read(#[source] io::Error),

    /// The control mode output stream ended
    #[error("tmux control mode exited: {0}")]
    Exited(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unroutable(_)
            | Error::MalformedCommand(_)
            | Error::MalformedPayload { .. }
            | Error::Uncorrelated
            | Error::QueueClosed(_)
            | Error::Unregistered(_)
            | Error::WorkerPanicked { .. } => ErrorKind::Invariant,
            Error::Spawn { .. }
            | Error::CommandFailed { .. }
            | Error::Rejected { .. }
            | Error::Write(_)
            | Error::Read(_)
            | Error::Exited(_) => ErrorKind::External,
        }
    }

    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        Error::MalformedPayload {
            what,
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
