//! Supervision of a transport's worker tasks.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{Instrument, Span};

use crate::error::{Error, Result};

/// Spawns the workers of one component and collects how each one ended.
pub(crate) struct Workers {
    span: Span,
    done_tx: mpsc::UnboundedSender<(&'static str, Result<()>)>,
    done_rx: mpsc::UnboundedReceiver<(&'static str, Result<()>)>,
    count: usize,
}

impl Workers {
    pub(crate) fn new(span: Span) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            span,
            done_tx,
            done_rx,
            count: 0,
        }
    }

    pub(crate) fn spawn<F>(&mut self, name: &'static str, worker: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(worker.instrument(self.span.clone()));
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::WorkerPanicked {
                    name,
                    message: e.to_string(),
                }),
            };
            // The handle may already have been dropped; nobody is left to tell.
            let _ = done.send((name, outcome));
        });
        self.count += 1;
    }

    pub(crate) fn into_handle(self) -> TransportHandle {
        TransportHandle {
            span: self.span,
            done_rx: self.done_rx,
            remaining: self.count,
        }
    }
}

/// Handle to a running transport.
pub struct TransportHandle {
    span: Span,
    done_rx: mpsc::UnboundedReceiver<(&'static str, Result<()>)>,
    remaining: usize,
}

impl TransportHandle {
    /// Wait until every worker has finished, or return the first failure.
    pub async fn wait(mut self) -> Result<()> {
        while self.remaining > 0 {
            let Some((name, outcome)) = self.done_rx.recv().await else {
                break;
            };
            self.remaining -= 1;

            let _enter = self.span.enter();
            match outcome {
                Ok(()) => tracing::debug!(worker = name, "worker finished"),
                Err(e) => {
                    tracing::error!(worker = name, error = %e, "worker failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
