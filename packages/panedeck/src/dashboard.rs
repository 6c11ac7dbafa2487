//! Headless dashboard.
//!
//! Requests the session tree and the client's current window, captures the
//! panes of the first session, and hands back the assembled tree. It stands in
//! for an interactive front-end on the bus: it consumes completion events and
//! key presses and produces requests.

use std::collections::HashSet;

use panedeck_core::{
    Consumer, Error, Event, EventSender, EventType, Logger, Producer, Result, Session,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Event types the dashboard registers for
pub const SUBSCRIPTIONS: [EventType; 4] = [
    EventType::KeyPressed,
    EventType::ListedTree,
    EventType::CapturedPane,
    EventType::FetchedCurrentWindow,
];

#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Every requested piece arrived
    Completed(Vec<Session>),
    /// A quit key arrived first
    Quit,
}

/// What the dashboard knows so far.
#[derive(Debug, Default)]
struct State {
    sessions: Option<Vec<Session>>,
    current: Option<(String, String)>,
    pending_captures: HashSet<String>,
}

impl State {
    /// Fold one event into the state and return the requests it triggers.
    fn apply(&mut self, event: Event) -> Vec<Event> {
        match event {
            Event::ListedTree { sessions } => {
                self.sessions = Some(sessions);
                self.drop_current_window();
                self.request_captures()
            }
            Event::CapturedPane { pane_id, snapshot } => {
                if !self.pending_captures.remove(&pane_id) {
                    tracing::debug!(pane_id = %pane_id, "capture was not requested");
                }
                let stored = self
                    .sessions
                    .iter_mut()
                    .flatten()
                    .any(|session| session.set_snapshot(&pane_id, snapshot.clone()));
                if !stored {
                    tracing::debug!(pane_id = %pane_id, "captured pane is no longer in the tree");
                }
                Vec::new()
            }
            Event::FetchedCurrentWindow {
                session_id,
                window_id,
            } => {
                self.current = Some((session_id, window_id));
                self.drop_current_window();
                Vec::new()
            }
            other => {
                tracing::debug!(event_type = %other.event_type(), "ignoring event");
                Vec::new()
            }
        }
    }

    fn drop_current_window(&mut self) {
        let (Some(sessions), Some((session_id, window_id))) = (&mut self.sessions, &self.current)
        else {
            return;
        };
        if let Some(session) = sessions.iter_mut().find(|s| &s.id == session_id) {
            session.remove_window(window_id);
        }
    }

    fn request_captures(&mut self) -> Vec<Event> {
        let Some(first) = self.sessions.as_ref().and_then(|s| s.first()) else {
            return Vec::new();
        };
        let mut requests = Vec::new();
        for pane in first.panes_without_snapshot() {
            if self.pending_captures.insert(pane.id.clone()) {
                requests.push(Event::capture_pane(pane.id.clone()));
            }
        }
        requests
    }

    fn is_complete(&self) -> bool {
        self.sessions.is_some() && self.current.is_some() && self.pending_captures.is_empty()
    }
}

pub struct Dashboard {
    inbound_tx: mpsc::Sender<Event>,
    inbound_rx: mpsc::Receiver<Event>,
    outbound: Option<EventSender>,
    logger: Logger,
}

impl Consumer for Dashboard {
    fn inbound(&self) -> mpsc::Sender<Event> {
        self.inbound_tx.clone()
    }
}

impl Producer for Dashboard {
    fn set_outbound(&mut self, outbound: EventSender) {
        self.outbound = Some(outbound);
    }
}

impl Dashboard {
    pub fn new(capacity: usize, logger: &Logger) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx,
            inbound_rx,
            outbound: None,
            logger: logger.group("dashboard"),
        }
    }

    /// Emit the initial requests and fold events until the tree is complete
    /// or a quit key arrives.
    pub fn start(self) -> Result<JoinHandle<Result<Outcome>>> {
        let Dashboard {
            inbound_tx,
            inbound_rx,
            outbound,
            logger,
        } = self;
        let outbound = outbound.ok_or(Error::Unregistered("dashboard"))?;
        drop(inbound_tx);

        Ok(tokio::spawn(run(inbound_rx, outbound).instrument(logger.span())))
    }
}

async fn run(mut inbound: mpsc::Receiver<Event>, outbound: EventSender) -> Result<Outcome> {
    outbound.emit(Event::ListTree).await?;
    outbound.emit(Event::FetchCurrentWindow).await?;

    let mut state = State::default();
    while let Some(event) = inbound.recv().await {
        if let Event::KeyPressed(key) = &event {
            if key.is_quit() {
                tracing::info!("quit requested");
                return Ok(Outcome::Quit);
            }
        }

        for request in state.apply(event) {
            outbound.emit(request).await?;
        }

        if state.is_complete() {
            tracing::info!("dashboard complete");
            return Ok(Outcome::Completed(state.sessions.unwrap_or_default()));
        }
    }
    Err(Error::QueueClosed("dashboard inbound"))
}
