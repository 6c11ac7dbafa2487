//! Typed events exchanged over the bus.
//!
//! The variant of [`Event`] is its type tag: a payload can never disagree with
//! the type it was routed by.

pub mod router;

use std::fmt;
use std::path::PathBuf;

use crate::session::Session;

/// Routing key of an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    KeyPressed,
    ListTree,
    ListedTree,
    CapturePane,
    CapturedPane,
    FetchCurrentWindow,
    FetchedCurrentWindow,
    ListFolders,
    ListedFolders,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::KeyPressed => "KeyPressed",
            EventType::ListTree => "ListTree",
            EventType::ListedTree => "ListedTree",
            EventType::CapturePane => "CapturePane",
            EventType::CapturedPane => "CapturedPane",
            EventType::FetchCurrentWindow => "FetchCurrentWindow",
            EventType::FetchedCurrentWindow => "FetchedCurrentWindow",
            EventType::ListFolders => "ListFolders",
            EventType::ListedFolders => "ListedFolders",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys the front-end distinguishes beyond plain characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    Usual,
    Up,
    Down,
    Left,
    Right,
    Esc,
    Backspace,
    Enter,
    Tab,
    ShiftTab,
    /// Ctrl-C
    Etx,
    /// Ctrl-D
    Eot,
    CtrlR,
    CtrlT,
    CtrlE,
    Ignore,
}

/// A decoded key press. `ch` is set only for [`SpecialKey::Usual`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub special: SpecialKey,
    pub ch: Option<char>,
}

impl Key {
    pub fn char(ch: char) -> Self {
        Self {
            special: SpecialKey::Usual,
            ch: Some(ch),
        }
    }

    pub fn special(special: SpecialKey) -> Self {
        Self { special, ch: None }
    }

    /// Keys that end an interactive run
    pub fn is_quit(&self) -> bool {
        matches!(
            self.special,
            SpecialKey::Esc | SpecialKey::Etx | SpecialKey::Eot
        )
    }
}

/// A message on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    KeyPressed(Key),

    /// Request the full session/window/pane tree
    ListTree,
    ListedTree { sessions: Vec<Session> },

    /// Request the contents of one pane
    CapturePane { pane_id: String },
    CapturedPane { pane_id: String, snapshot: String },

    /// Request the session and window the client is attached to
    FetchCurrentWindow,
    FetchedCurrentWindow { session_id: String, window_id: String },

    /// Request session candidates from directories
    ListFolders { folders: Vec<PathBuf> },
    ListedFolders { sessions: Vec<Session> },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::KeyPressed(_) => EventType::KeyPressed,
            Event::ListTree => EventType::ListTree,
            Event::ListedTree { .. } => EventType::ListedTree,
            Event::CapturePane { .. } => EventType::CapturePane,
            Event::CapturedPane { .. } => EventType::CapturedPane,
            Event::FetchCurrentWindow => EventType::FetchCurrentWindow,
            Event::FetchedCurrentWindow { .. } => EventType::FetchedCurrentWindow,
            Event::ListFolders { .. } => EventType::ListFolders,
            Event::ListedFolders { .. } => EventType::ListedFolders,
        }
    }

    pub fn capture_pane(pane_id: impl Into<String>) -> Self {
        Event::CapturePane {
            pane_id: pane_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_follows_variant() {
        assert_eq!(Event::ListTree.event_type(), EventType::ListTree);
        assert_eq!(
            Event::capture_pane("%1").event_type(),
            EventType::CapturePane
        );
        assert_eq!(
            Event::FetchedCurrentWindow {
                session_id: "$0".to_string(),
                window_id: "@1".to_string(),
            }
            .event_type(),
            EventType::FetchedCurrentWindow
        );
        assert_eq!(
            Event::KeyPressed(Key::char('q')).event_type(),
            EventType::KeyPressed
        );
    }

    #[test]
    fn test_quit_keys() {
        assert!(Key::special(SpecialKey::Esc).is_quit());
        assert!(Key::special(SpecialKey::Etx).is_quit());
        assert!(!Key::special(SpecialKey::Enter).is_quit());
        assert!(!Key::char('q').is_quit());
    }
}
