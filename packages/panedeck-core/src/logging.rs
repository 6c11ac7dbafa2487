//! Injected logging capability.
//!
//! A [`Logger`] is created once at process start and handed to each component
//! at construction. Components derive a named group from it and instrument
//! their workers with the group's span, so every record carries the component
//! that produced it without any process-wide logger object.

use tracing::Span;

#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Root logger for the application.
    pub fn new(app: &'static str) -> Self {
        Self {
            span: tracing::info_span!("app", name = app),
        }
    }

    /// Logger that records nothing of its own; used by tests and embedders
    /// that do not install a subscriber.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Child logger for one component.
    pub fn group(&self, name: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "component", group = name),
        }
    }

    /// Span to instrument a component's workers with.
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}
