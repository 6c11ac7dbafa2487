//! Single-ingress, multi-egress event router.
//!
//! Producers share one bounded inbound queue. The dispatch task fans each
//! event out to every consumer queue registered for its type. Registration
//! happens before [`Router::start`], which moves the routing table into the
//! dispatch task; it is never modified afterwards.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{Event, EventType};
use crate::error::{Error, Result};
use crate::logging::Logger;

/// A component that receives events through its own bounded queue.
pub trait Consumer {
    /// Sending half of the component's inbound queue.
    fn inbound(&self) -> mpsc::Sender<Event>;
}

/// A component that emits events onto the bus.
pub trait Producer {
    fn set_outbound(&mut self, outbound: EventSender);
}

/// Handle for emitting events into the router's inbound queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Queue an event, waiting while the inbound queue is full.
    pub async fn emit(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::QueueClosed("router inbound"))
    }
}

pub struct Router {
    routes: HashMap<EventType, Vec<mpsc::Sender<Event>>>,
    inbound_tx: mpsc::Sender<Event>,
    inbound_rx: mpsc::Receiver<Event>,
    logger: Logger,
}

impl Router {
    pub fn new(capacity: usize, logger: &Logger) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        Self {
            routes: HashMap::new(),
            inbound_tx,
            inbound_rx,
            logger: logger.group("event"),
        }
    }

    /// Deliver every event of the listed types to `consumer`.
    pub fn register_consumer<C: Consumer + ?Sized>(&mut self, types: &[EventType], consumer: &C) {
        let inbound = consumer.inbound();
        for event_type in types {
            self.routes
                .entry(*event_type)
                .or_default()
                .push(inbound.clone());
        }
    }

    /// Point `producer` at the shared inbound queue.
    pub fn register_producer<P: Producer + ?Sized>(&self, producer: &mut P) {
        producer.set_outbound(self.emitter());
    }

    pub fn emitter(&self) -> EventSender {
        EventSender::new(self.inbound_tx.clone())
    }

    /// Spawn the dispatch task.
    ///
    /// The task ends once every [`EventSender`] has been dropped, or fails if a
    /// registered consumer has dropped its queue.
    pub fn start(self) -> JoinHandle<Result<()>> {
        let Router {
            routes,
            inbound_tx,
            inbound_rx,
            logger,
        } = self;
        drop(inbound_tx);

        let span = logger.span();
        span.in_scope(|| tracing::info!(routes = routes.len(), "starting event router"));
        tokio::spawn(dispatch(routes, inbound_rx).instrument(span))
    }
}

async fn dispatch(
    routes: HashMap<EventType, Vec<mpsc::Sender<Event>>>,
    mut inbound: mpsc::Receiver<Event>,
) -> Result<()> {
    while let Some(event) = inbound.recv().await {
        let event_type = event.event_type();
        let Some(destinations) = routes.get(&event_type) else {
            tracing::debug!(%event_type, "no consumers registered, dropping event");
            continue;
        };

        tracing::trace!(%event_type, destinations = destinations.len(), "dispatching event");
        for destination in destinations {
            destination
                .send(event.clone())
                .await
                .map_err(|_| Error::QueueClosed("consumer inbound"))?;
        }
    }

    tracing::info!("all producers gone, event router stopping");
    Ok(())
}
