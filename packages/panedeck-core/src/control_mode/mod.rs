//! tmux control mode transport
//!
//! Keeps one `tmux -C` client attached for the whole run and pipelines
//! commands through it. Responses carry no request id: they are matched to
//! commands purely by order, relying on tmux answering its input stream
//! strictly in sequence.

pub mod connection;
pub mod engine;
pub mod parser;

pub use connection::ControlModeConnection;
pub use engine::ControlModeEngine;
pub use parser::{Block, BlockParser, ParsedLine};
