//! Pipelined request/response engine over a control mode client.
//!
//! Four workers joined by bounded queues:
//!
//! ```text
//! inbound events -> [events] -> commands -> [transmit] -> tmux stdin
//!                                               |
//!                                          correlation
//!                                               v
//! tmux stdout ------------------------------> [receive] -> results -> [emit] -> bus
//! ```
//!
//! The transmit worker queues a command for correlation before writing it, so
//! by the time tmux can answer, the command is already waiting in the queue.
//! tmux announces the attach with one unsolicited block, which is discarded.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::connection::ControlModeConnection;
use super::parser::{BlockParser, ParsedLine};
use crate::command::{Command, CommandResult};
use crate::convert;
use crate::error::{Error, Result};
use crate::event::router::{Consumer, EventSender, Producer};
use crate::event::Event;
use crate::logging::Logger;
use crate::worker::{TransportHandle, Workers};
use crate::TransportConfig;

pub struct ControlModeEngine {
    config: TransportConfig,
    inbound_tx: mpsc::Sender<Event>,
    inbound_rx: mpsc::Receiver<Event>,
    outbound: Option<EventSender>,
    logger: Logger,
}

impl Consumer for ControlModeEngine {
    fn inbound(&self) -> mpsc::Sender<Event> {
        self.inbound_tx.clone()
    }
}

impl Producer for ControlModeEngine {
    fn set_outbound(&mut self, outbound: EventSender) {
        tracing::debug!(parent: &self.logger.span(), "set output event queue for tmux");
        self.outbound = Some(outbound);
    }
}

impl ControlModeEngine {
    pub fn new(config: TransportConfig, logger: &Logger) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity);
        Self {
            config,
            inbound_tx,
            inbound_rx,
            outbound: None,
            logger: logger.group("tmux_control_mode"),
        }
    }

    /// Attach a control mode client and start the engine on its pipes.
    pub fn attach(self) -> Result<(ControlModeConnection, TransportHandle)> {
        let mut connection = ControlModeConnection::attach(&self.config.program)?;
        let (stdin, stdout) = connection
            .take_io()
            .ok_or_else(|| Error::Exited("control mode pipes unavailable".to_string()))?;
        let handle = self.start(stdin, stdout)?;
        Ok((connection, handle))
    }

    /// Start the workers on an already-open command writer and output reader.
    pub fn start<W, R>(self, writer: W, reader: R) -> Result<TransportHandle>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let ControlModeEngine {
            config,
            inbound_tx,
            inbound_rx,
            outbound,
            logger,
        } = self;
        let outbound = outbound.ok_or(Error::Unregistered("tmux control mode"))?;
        // Only the bus keeps the inbound queue open from here on.
        drop(inbound_tx);

        let capacity = config.queue_capacity;
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (correlation_tx, correlation_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);

        let span = logger.span();
        span.in_scope(|| {
            tracing::info!(program = %config.program, "starting tmux control mode engine")
        });

        let mut workers = Workers::new(span);
        workers.spawn("events", convert::commands_from_events(inbound_rx, commands_tx));
        workers.spawn("transmit", transmit(commands_rx, correlation_tx, writer));
        workers.spawn("receive", receive(reader, correlation_rx, results_tx));
        workers.spawn("emit", convert::events_from_results(results_rx, outbound));
        Ok(workers.into_handle())
    }
}

/// A command line must be exactly one line of text.
fn validate_line(line: &str) -> Result<()> {
    if line.trim().is_empty() || line.contains(['\n', '\r']) {
        return Err(Error::MalformedCommand(line.to_string()));
    }
    Ok(())
}

async fn transmit<W>(
    mut commands: mpsc::Receiver<Command>,
    correlation: mpsc::Sender<Command>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let mut line = command.command_line(true);
        validate_line(&line)?;
        tracing::info!(command = %line, "start tmux command");

        correlation
            .send(command)
            .await
            .map_err(|_| Error::QueueClosed("tmux correlation"))?;

        line.push('\n');
        writer.write_all(line.as_bytes()).await.map_err(Error::Write)?;
        writer.flush().await.map_err(Error::Write)?;
    }

    // Dropping the writer closes tmux's stdin, which detaches the client.
    tracing::info!("no more commands, closing control mode input");
    Ok(())
}

async fn receive<R>(
    mut reader: R,
    mut correlation: mpsc::Receiver<Command>,
    results: mpsc::Sender<CommandResult>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut parser = BlockParser::new();
    let mut startup_block_seen = false;
    let mut buf = Vec::with_capacity(4096);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await.map_err(Error::Read)? == 0 {
            return end_of_stream(&mut correlation, "output closed".to_string());
        }
        // Only the terminator goes; a carriage return inside a capture is payload.
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf);

        let block = match parser.parse_line(&line) {
            ParsedLine::Pending => continue,
            ParsedLine::Notification(notification) => {
                tracing::trace!(%notification, "ignoring notification");
                continue;
            }
            ParsedLine::Exit(reason) => {
                let reason = reason.unwrap_or_else(|| "%exit without reason".to_string());
                return end_of_stream(&mut correlation, reason);
            }
            ParsedLine::Block(block) => block,
        };

        if !startup_block_seen {
            startup_block_seen = true;
            tracing::debug!("discarding startup block");
            continue;
        }

        // Every command is queued here before its line is written, so an
        // empty queue means tmux sent a block nobody asked for.
        let command = correlation.try_recv().map_err(|_| Error::Uncorrelated)?;

        if !block.success {
            return Err(Error::Rejected {
                command: command.command_line(true),
                message: block.output.trim_end().to_string(),
            });
        }

        tracing::info!(command = command.name(), bytes = block.output.len(), "finish tmux command");
        let result = command.complete(&block.output)?;
        results
            .send(result)
            .await
            .map_err(|_| Error::QueueClosed("tmux results"))?;
    }
}

/// tmux leaving (`%exit` or closed output) is expected only after we closed
/// its input and every command was answered.
fn end_of_stream(correlation: &mut mpsc::Receiver<Command>, reason: String) -> Result<()> {
    match correlation.try_recv() {
        Err(TryRecvError::Disconnected) => {
            tracing::info!(%reason, "control mode client detached");
            Ok(())
        }
        Ok(command) => Err(Error::Exited(format!(
            "{} while `{}` was in flight",
            reason,
            command.command_line(true)
        ))),
        Err(TryRecvError::Empty) => Err(Error::Exited(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::router::Router;
    use crate::event::{EventType, Key};
    use std::time::Duration;
    use tokio::io::{BufReader, DuplexStream, Lines};

    const BANNER: &str = "%begin 1700000000 0 0\n%end 1700000000 0 0\n";

    /// The tmux side of an engine under test
    struct FakeTmux {
        commands: Lines<BufReader<DuplexStream>>,
        output: DuplexStream,
        seq: u32,
    }

    impl FakeTmux {
        async fn next_command(&mut self) -> String {
            tokio::time::timeout(Duration::from_secs(5), self.commands.next_line())
                .await
                .expect("timed out waiting for a command")
                .unwrap()
                .expect("engine closed its input")
        }

        async fn write(&mut self, text: &str) {
            self.output.write_all(text.as_bytes()).await.unwrap();
        }

        async fn respond(&mut self, body: &str) {
            self.reply("%end", body).await;
        }

        async fn reply(&mut self, guard: &str, body: &str) {
            self.seq += 1;
            let text = format!(
                "%begin 1700000000 {seq} 1\n{body}{guard} 1700000000 {seq} 1\n",
                seq = self.seq
            );
            self.write(&text).await;
        }
    }

    /// Engine wired to in-memory pipes, emitting into a plain queue.
    fn start_engine() -> (mpsc::Sender<Event>, mpsc::Receiver<Event>, FakeTmux, TransportHandle) {
        let mut engine = ControlModeEngine::new(TransportConfig::default(), &Logger::disabled());
        let (out_tx, out_rx) = mpsc::channel(crate::QUEUE_CAPACITY);
        engine.set_outbound(EventSender::new(out_tx));
        let inbound = engine.inbound();

        let (engine_stdin, tmux_stdin) = tokio::io::duplex(64 * 1024);
        let (tmux_stdout, engine_stdout) = tokio::io::duplex(64 * 1024);
        let handle = engine.start(engine_stdin, BufReader::new(engine_stdout)).unwrap();

        let tmux = FakeTmux {
            commands: BufReader::new(tmux_stdin).lines(),
            output: tmux_stdout,
            seq: 0,
        };
        (inbound, out_rx, tmux, handle)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("engine closed its output")
    }

    #[tokio::test]
    async fn test_pipelined_results_keep_submission_order() {
        let (inbound, mut events, mut tmux, _handle) = start_engine();
        tmux.write(BANNER).await;

        let panes: Vec<String> = (0..10).map(|i| format!("%{}", i)).collect();
        for pane in &panes {
            inbound.send(Event::capture_pane(pane.clone())).await.unwrap();
        }

        // Every command is on the wire before any response is written
        let mut lines = Vec::new();
        for _ in &panes {
            lines.push(tmux.next_command().await);
        }
        for line in &lines {
            let pane = line.rsplit(' ').next().unwrap().to_string();
            tmux.respond(&format!("contents of {}\n", pane)).await;
        }

        for pane in &panes {
            assert_eq!(
                next_event(&mut events).await,
                Event::CapturedPane {
                    pane_id: pane.clone(),
                    snapshot: format!("contents of {}\n", pane),
                }
            );
        }
    }

    #[tokio::test]
    async fn test_startup_block_discarded_whatever_it_contains() {
        let (inbound, mut events, mut tmux, _handle) = start_engine();
        // Looks like a perfectly good capture, but it is the attach banner
        tmux.write("%begin 1 0 0\nbanner text\n%end 1 0 0\n").await;

        inbound.send(Event::capture_pane("%1")).await.unwrap();
        assert_eq!(tmux.next_command().await, "capture-pane -p -e -t %1");
        tmux.respond("real\n").await;

        assert_eq!(
            next_event(&mut events).await,
            Event::CapturedPane {
                pane_id: "%1".to_string(),
                snapshot: "real\n".to_string(),
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mixed_commands_and_notifications() {
        let (inbound, mut events, mut tmux, _handle) = start_engine();
        tmux.write(BANNER).await;

        inbound.send(Event::ListTree).await.unwrap();
        inbound.send(Event::FetchCurrentWindow).await.unwrap();
        assert!(tmux.next_command().await.starts_with("list-panes -a -F \""));
        assert_eq!(
            tmux.next_command().await,
            "display-message -p -F \"#{session_id}.#{window_id}\""
        );

        tmux.write("%sessions-changed\n").await;
        tmux.respond("main|edit|nvim|1.0|1.1.1|1700000000|$0.@1.%1\n").await;
        tmux.write("%window-add @9\n").await;
        tmux.respond("$0.@1\n").await;

        match next_event(&mut events).await {
            Event::ListedTree { sessions } => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].windows[0].panes[0].id, "%1");
            }
            other => panic!("Expected ListedTree, got {:?}", other),
        }
        assert_eq!(
            next_event(&mut events).await,
            Event::FetchedCurrentWindow {
                session_id: "$0".to_string(),
                window_id: "@1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_tree() {
        let (inbound, mut events, mut tmux, _handle) = start_engine();
        tmux.write(BANNER).await;

        inbound.send(Event::ListTree).await.unwrap();
        tmux.next_command().await;
        tmux.respond("").await;

        assert_eq!(
            next_event(&mut events).await,
            Event::ListedTree { sessions: vec![] }
        );
    }

    #[tokio::test]
    async fn test_error_block_is_fatal() {
        let (inbound, _events, mut tmux, handle) = start_engine();
        tmux.write(BANNER).await;

        inbound.send(Event::capture_pane("%99")).await.unwrap();
        tmux.next_command().await;
        tmux.reply("%error", "can't find pane: %99\n").await;

        match handle.wait().await {
            Err(Error::Rejected { command, message }) => {
                assert_eq!(command, "capture-pane -p -e -t %99");
                assert_eq!(message, "can't find pane: %99");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsolicited_block_is_fatal() {
        let (_inbound, _events, mut tmux, handle) = start_engine();
        tmux.write(BANNER).await;
        tmux.respond("nobody asked\n").await;

        assert!(matches!(handle.wait().await, Err(Error::Uncorrelated)));
    }

    #[tokio::test]
    async fn test_unroutable_event_is_fatal() {
        let (inbound, _events, _tmux, handle) = start_engine();
        inbound
            .send(Event::KeyPressed(Key::char('j')))
            .await
            .unwrap();

        match handle.wait().await {
            Err(Error::Unroutable(t)) => assert_eq!(t, EventType::KeyPressed),
            other => panic!("Expected Unroutable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_command_line_is_fatal() {
        let (inbound, _events, _tmux, handle) = start_engine();
        inbound
            .send(Event::capture_pane("%1\nkill-server"))
            .await
            .unwrap();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, Error::MalformedCommand(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Invariant);
    }

    #[tokio::test]
    async fn test_output_closed_is_fatal() {
        let (_inbound, _events, mut tmux, handle) = start_engine();
        tmux.write(BANNER).await;
        drop(tmux);

        assert!(matches!(handle.wait().await, Err(Error::Exited(_))));
    }

    #[tokio::test]
    async fn test_exit_notification_is_fatal() {
        let (_inbound, _events, mut tmux, handle) = start_engine();
        tmux.write(BANNER).await;
        tmux.write("%exit server exited\n").await;

        match handle.wait().await {
            Err(Error::Exited(reason)) => assert_eq!(reason, "server exited"),
            other => panic!("Expected Exited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let (inbound, _events, tmux, handle) = start_engine();
        let FakeTmux {
            commands, output, ..
        } = tmux;
        // tmux stops reading its input but keeps its output open
        drop(commands);

        inbound.send(Event::ListTree).await.unwrap();
        assert!(matches!(handle.wait().await, Err(Error::Write(_))));
        drop(output);
    }

    #[tokio::test]
    async fn test_orderly_shutdown() {
        let (inbound, mut events, mut tmux, handle) = start_engine();
        tmux.write(BANNER).await;

        inbound.send(Event::capture_pane("%1")).await.unwrap();
        tmux.next_command().await;
        tmux.respond("x\n").await;
        next_event(&mut events).await;

        // Closing the inbound queue closes tmux's input; tmux then says
        // goodbye and exits.
        drop(inbound);
        assert!(tmux.commands.next_line().await.unwrap().is_none());
        tmux.write("%exit\n").await;
        drop(tmux);

        assert!(handle.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_exit_with_command_in_flight_is_fatal() {
        let (inbound, _events, mut tmux, handle) = start_engine();
        tmux.write(BANNER).await;

        inbound.send(Event::capture_pane("%1")).await.unwrap();
        tmux.next_command().await;
        drop(inbound);
        assert!(tmux.commands.next_line().await.unwrap().is_none());
        tmux.write("%exit\n").await;

        match handle.wait().await {
            Err(Error::Exited(reason)) => {
                assert_eq!(
                    reason,
                    "%exit without reason while `capture-pane -p -e -t %1` was in flight"
                )
            }
            other => panic!("Expected Exited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capture_keeps_trailing_carriage_return() {
        let (inbound, mut events, mut tmux, _handle) = start_engine();
        tmux.write(BANNER).await;

        inbound.send(Event::capture_pane("%1")).await.unwrap();
        tmux.next_command().await;
        tmux.respond("progress 50%\r\nprompt$ \n").await;

        assert_eq!(
            next_event(&mut events).await,
            Event::CapturedPane {
                pane_id: "%1".to_string(),
                snapshot: "progress 50%\r\nprompt$ \n".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_not_registered_as_producer() {
        let engine = ControlModeEngine::new(TransportConfig::default(), &Logger::disabled());
        let (writer, _peer) = tokio::io::duplex(64);
        let (_tmux, reader) = tokio::io::duplex(64);
        assert!(matches!(
            engine.start(writer, BufReader::new(reader)),
            Err(Error::Unregistered(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_round_trips_through_router() {
        struct Ui {
            tx: mpsc::Sender<Event>,
        }
        impl Consumer for Ui {
            fn inbound(&self) -> mpsc::Sender<Event> {
                self.tx.clone()
            }
        }

        let logger = Logger::disabled();
        let mut router = Router::new(crate::QUEUE_CAPACITY, &logger);
        let mut engine = ControlModeEngine::new(TransportConfig::default(), &logger);
        let (ui_tx, mut ui_rx) = mpsc::channel(crate::QUEUE_CAPACITY);
        let ui = Ui { tx: ui_tx };

        router.register_consumer(&[EventType::CapturedPane], &ui);
        router.register_consumer(&[EventType::CapturePane], &engine);
        router.register_producer(&mut engine);

        let (engine_stdin, tmux_stdin) = tokio::io::duplex(64 * 1024);
        let (tmux_stdout, engine_stdout) = tokio::io::duplex(64 * 1024);
        let _handle = engine.start(engine_stdin, BufReader::new(engine_stdout)).unwrap();

        // tmux answers each capture with the pane id it was asked for
        tokio::spawn(async move {
            let mut tmux = FakeTmux {
                commands: BufReader::new(tmux_stdin).lines(),
                output: tmux_stdout,
                seq: 0,
            };
            tmux.write(BANNER).await;
            while let Ok(Some(line)) = tmux.commands.next_line().await {
                let pane = line.rsplit(' ').next().unwrap_or_default().to_string();
                tmux.respond(&format!("snapshot {}\n", pane)).await;
            }
        });

        let first = router.emitter();
        let second = router.emitter();
        let _router = router.start();

        let a = tokio::spawn(async move { first.emit(Event::capture_pane("%1")).await });
        let b = tokio::spawn(async move { second.emit(Event::capture_pane("%2")).await });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let mut received = vec![next_event(&mut ui_rx).await, next_event(&mut ui_rx).await];
        received.sort_by_key(|e| match e {
            Event::CapturedPane { pane_id, .. } => pane_id.clone(),
            _ => String::new(),
        });
        assert_eq!(
            received,
            vec![
                Event::CapturedPane {
                    pane_id: "%1".to_string(),
                    snapshot: "snapshot %1\n".to_string(),
                },
                Event::CapturedPane {
                    pane_id: "%2".to_string(),
                    snapshot: "snapshot %2\n".to_string(),
                },
            ]
        );
    }
}
