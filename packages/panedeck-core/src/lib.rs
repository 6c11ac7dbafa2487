pub mod cli_mode;
pub mod command;
pub mod control_mode;
pub mod convert;
pub mod error;
pub mod event;
pub mod executor;
pub mod logging;
pub mod session;
mod worker;

pub use command::{Command, CommandResult};
pub use error::{Error, ErrorKind, Result};
pub use event::router::{Consumer, EventSender, Producer, Router};
pub use event::{Event, EventType};
pub use logging::Logger;
pub use session::{Pane, Session, Window};
pub use worker::TransportHandle;

/// Capacity of every bounded queue between workers (bus ingress, per-consumer
/// inboxes, transport pipelines).
pub const QUEUE_CAPACITY: usize = 100;

/// Default tmux binary used by both transports
pub const DEFAULT_TMUX_PROGRAM: &str = "tmux";

/// Configuration shared by the pipelined and one-shot transports
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Program invoked for tmux (control mode or one-shot)
    pub program: String,

    /// Capacity of the transport's internal queues
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_TMUX_PROGRAM.to_string(),
            queue_capacity: QUEUE_CAPACITY,
        }
    }
}
