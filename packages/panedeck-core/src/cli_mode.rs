//! One-shot tmux transport.
//!
//! Offers the same Consumer/Producer contract as the control mode engine but
//! runs every command as its own short-lived process, one at a time. Each
//! process's output is read to the end before the next command starts, so
//! there is nothing to correlate.

use tokio::sync::mpsc;

use crate::command::{Command, CommandResult};
use crate::convert;
use crate::error::{Error, Result};
use crate::event::router::{Consumer, EventSender, Producer};
use crate::event::Event;
use crate::executor;
use crate::logging::Logger;
use crate::worker::{TransportHandle, Workers};
use crate::TransportConfig;

pub struct CliModeTransport {
    config: TransportConfig,
    inbound_tx: mpsc::Sender<Event>,
    inbound_rx: mpsc::Receiver<Event>,
    outbound: Option<EventSender>,
    logger: Logger,
}

impl Consumer for CliModeTransport {
    fn inbound(&self) -> mpsc::Sender<Event> {
        self.inbound_tx.clone()
    }
}

impl Producer for CliModeTransport {
    fn set_outbound(&mut self, outbound: EventSender) {
        self.outbound = Some(outbound);
    }
}

impl CliModeTransport {
    pub fn new(config: TransportConfig, logger: &Logger) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity);
        Self {
            config,
            inbound_tx,
            inbound_rx,
            outbound: None,
            logger: logger.group("tmux_cli_mode"),
        }
    }

    pub fn start(self) -> Result<TransportHandle> {
        let CliModeTransport {
            config,
            inbound_tx,
            inbound_rx,
            outbound,
            logger,
        } = self;
        let outbound = outbound.ok_or(Error::Unregistered("tmux cli mode"))?;
        drop(inbound_tx);

        let (commands_tx, commands_rx) = mpsc::channel(config.queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.queue_capacity);

        let span = logger.span();
        span.in_scope(|| {
            tracing::info!(program = %config.program, "starting tmux command handler")
        });

        let mut workers = Workers::new(span);
        workers.spawn("events", convert::commands_from_events(inbound_rx, commands_tx));
        workers.spawn("handler", handle_commands(config.program, commands_rx, results_tx));
        workers.spawn("emit", convert::events_from_results(results_rx, outbound));
        Ok(workers.into_handle())
    }
}

async fn handle_commands(
    program: String,
    mut commands: mpsc::Receiver<Command>,
    results: mpsc::Sender<CommandResult>,
) -> Result<()> {
    while let Some(command) = commands.recv().await {
        let args = command.args();
        tracing::info!(args = %args.join(" "), "executing tmux command");

        let program = program.clone();
        let output =
            tokio::task::spawn_blocking(move || executor::execute_command(&program, &args))
                .await
                .map_err(|e| Error::WorkerPanicked {
                    name: "tmux cli mode process",
                    message: e.to_string(),
                })??;

        let result = command.complete(&output)?;
        results
            .send(result)
            .await
            .map_err(|_| Error::QueueClosed("tmux results"))?;
    }
    Ok(())
}
