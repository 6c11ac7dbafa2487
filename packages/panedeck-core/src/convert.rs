//! Mapping between bus events and tmux commands.
//!
//! This is the only place the event layer and the protocol layer meet.

use tokio::sync::mpsc;

use crate::command::{Command, CommandResult};
use crate::error::{Error, Result};
use crate::event::router::EventSender;
use crate::event::Event;

/// Command for a request event. Events with no tmux counterpart are rejected.
pub fn event_to_command(event: Event) -> Result<Command> {
    match event {
        Event::CapturePane { pane_id } => Ok(Command::CapturePane { pane_id }),
        Event::ListTree => Ok(Command::ListTree),
        Event::FetchCurrentWindow => Ok(Command::CurrentWindow),
        other => Err(Error::Unroutable(other.event_type())),
    }
}

/// Completion event for a finished command.
pub fn result_to_event(result: CommandResult) -> Event {
    match result {
        CommandResult::CapturedPane { pane_id, snapshot } => {
            Event::CapturedPane { pane_id, snapshot }
        }
        CommandResult::ListedTree { sessions } => Event::ListedTree { sessions },
        CommandResult::CurrentWindow {
            session_id,
            window_id,
        } => Event::FetchedCurrentWindow {
            session_id,
            window_id,
        },
    }
}

/// Transport worker: turn inbound events into commands.
pub(crate) async fn commands_from_events(
    mut inbound: mpsc::Receiver<Event>,
    commands: mpsc::Sender<Command>,
) -> Result<()> {
    while let Some(event) = inbound.recv().await {
        let command = event_to_command(event)?;
        commands
            .send(command)
            .await
            .map_err(|_| Error::QueueClosed("tmux commands"))?;
    }
    Ok(())
}

/// Transport worker: publish completed commands as events.
pub(crate) async fn events_from_results(
    mut results: mpsc::Receiver<CommandResult>,
    outbound: EventSender,
) -> Result<()> {
    while let Some(result) = results.recv().await {
        outbound.emit(result_to_event(result)).await?;
    }
    Ok(())
}
