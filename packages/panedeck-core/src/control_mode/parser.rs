//! Line parser for tmux control mode output
//!
//! Command output is wrapped in guard lines:
//! - `%begin timestamp command-number flags` opens a block
//! - `%end timestamp command-number flags` closes it on success
//! - `%error timestamp command-number flags` closes it on failure
//!
//! Every other `%` line outside a block is an asynchronous notification.

/// A completed command response block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Lines between the guards, each terminated by `\n`
    pub output: String,
    pub success: bool,
}

/// What a single line of output amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Nothing complete yet (block payload, opening guard, or unknown line)
    Pending,
    /// A response block was closed by this line
    Block(Block),
    /// Asynchronous notification outside a block, e.g. `%sessions-changed`
    Notification(String),
    /// `%exit [reason]`: the control client is going away
    Exit(Option<String>),
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    InBlock {
        end: String,
        error: String,
    },
}

/// State machine over the control mode output stream
#[derive(Debug, Default)]
pub struct BlockParser {
    state: State,
    buffer: String,
}

impl BlockParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_block(&self) -> bool {
        matches!(self.state, State::InBlock { .. })
    }

    /// Feed one line (without its line terminator).
    pub fn parse_line(&mut self, line: &str) -> ParsedLine {
        if let State::InBlock { end, error } = &self.state {
            // Only the exact closing guard ends the block, so payload lines
            // that happen to start with %end stay payload.
            let success = if line == end {
                true
            } else if line == error {
                false
            } else {
                self.buffer.push_str(line);
                self.buffer.push('\n');
                return ParsedLine::Pending;
            };

            self.state = State::Idle;
            return ParsedLine::Block(Block {
                output: std::mem::take(&mut self.buffer),
                success,
            });
        }

        if let Some(rest) = line.strip_prefix("%begin") {
            self.state = State::InBlock {
                end: format!("%end{}", rest),
                error: format!("%error{}", rest),
            };
            self.buffer.clear();
            return ParsedLine::Pending;
        }

        if let Some(rest) = line.strip_prefix("%exit") {
            let reason = rest.trim();
            return ParsedLine::Exit(if reason.is_empty() {
                None
            } else {
                Some(reason.to_string())
            });
        }

        if line.starts_with('%') {
            return ParsedLine::Notification(line.to_string());
        }

        ParsedLine::Pending
    }
}
