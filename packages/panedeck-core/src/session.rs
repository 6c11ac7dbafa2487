//! Session/window/pane tree built from a `list-panes -a` report.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single tmux pane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pane {
    pub id: String, // e.g., "%0"
    pub index: u32,
    pub current_command: String,
    pub active: bool,
    /// Captured contents, filled in once a capture-pane result arrives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

/// A single tmux window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub id: String, // e.g., "@0"
    pub index: u32,
    pub name: String,
    pub active: bool,
    pub panes: Vec<Pane>,
}

/// A tmux session with its windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String, // e.g., "$0"
    pub name: String,
    pub attached: bool,
    /// Unix timestamp of the last attach, if the session was ever attached
    pub last_attached: Option<u64>,
    pub windows: Vec<Window>,
    /// Directory a not-yet-created session would start in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Session {
    /// Panes whose contents have not been captured yet.
    pub fn panes_without_snapshot(&self) -> Vec<&Pane> {
        self.windows
            .iter()
            .flat_map(|w| w.panes.iter())
            .filter(|p| p.snapshot.as_deref().map_or(true, str::is_empty))
            .collect()
    }

    /// Store a captured snapshot. Returns false if the pane is not in this session.
    pub fn set_snapshot(&mut self, pane_id: &str, snapshot: String) -> bool {
        let pane = self
            .windows
            .iter_mut()
            .flat_map(|w| w.panes.iter_mut())
            .find(|p| p.id == pane_id);

        match pane {
            Some(pane) => {
                pane.snapshot = Some(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn has_pane(&self, pane_id: &str) -> bool {
        self.windows
            .iter()
            .flat_map(|w| w.panes.iter())
            .any(|p| p.id == pane_id)
    }

    /// Drop a window (used to hide the window the client is sitting in).
    pub fn remove_window(&mut self, window_id: &str) {
        self.windows.retain(|w| w.id != window_id);
    }
}

/// One line of the list-panes report
#[derive(Debug)]
struct PaneRecord {
    session_name: String,
    window_name: String,
    current_command: String,
    window_index: u32,
    pane_index: u32,
    session_attached: bool,
    window_active: bool,
    pane_active: bool,
    last_attached: Option<u64>,
    session_id: String,
    window_id: String,
    pane_id: String,
}

const REPORT: &str = "list-tree";

/// Split `value` on `sep` into exactly `N` parts.
fn split_exact<'a, const N: usize>(value: &'a str, sep: char, field: &str) -> Result<[&'a str; N]> {
    let parts: Vec<&str> = value.split(sep).collect();
    parts.try_into().map_err(|parts: Vec<&str>| {
        Error::malformed(
            REPORT,
            format!("{} {:?}: expected {} parts, got {}", field, value, N, parts.len()),
        )
    })
}

fn parse_index(value: &str, field: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|e| Error::malformed(REPORT, format!("invalid {} {:?}: {}", field, value, e)))
}

fn parse_record(line: &str) -> Result<PaneRecord> {
    // session|window|command|w.p|attached.active.active|last_attached|sid.wid.pid
    let [session_name, window_name, current_command, indices, flags, last_attached, ids] =
        split_exact::<7>(line, '|', "line")?;

    let [window_index, pane_index] = split_exact::<2>(indices, '.', "indices")?;
    let [session_attached, window_active, pane_active] = split_exact::<3>(flags, '.', "flags")?;
    let [session_id, window_id, pane_id] = split_exact::<3>(ids, '.', "ids")?;

    let last_attached = if last_attached.is_empty() {
        None
    } else {
        Some(last_attached.parse().map_err(|e| {
            Error::malformed(
                REPORT,
                format!("invalid last attached timestamp {:?}: {}", last_attached, e),
            )
        })?)
    };

    Ok(PaneRecord {
        session_name: session_name.to_string(),
        window_name: window_name.to_string(),
        current_command: current_command.to_string(),
        window_index: parse_index(window_index, "window index")?,
        pane_index: parse_index(pane_index, "pane index")?,
        // session_attached is a client count
        session_attached: session_attached != "0",
        window_active: window_active == "1",
        pane_active: pane_active == "1",
        last_attached,
        session_id: session_id.to_string(),
        window_id: window_id.to_string(),
        pane_id: pane_id.to_string(),
    })
}

/// Parse a `list-panes -a` report into sessions.
///
/// Windows and panes are ordered by index. Sessions are ordered by most recent
/// attach first, then the most recent one is moved to the end: it is usually
/// the session the client is already in, so the best switch target comes first.
pub fn parse_sessions(report: &str) -> Result<Vec<Session>> {
    let mut grouped: BTreeMap<String, BTreeMap<u32, BTreeMap<u32, PaneRecord>>> = BTreeMap::new();

    for line in report.lines().filter(|l| !l.is_empty()) {
        let record = parse_record(line)?;
        grouped
            .entry(record.session_name.clone())
            .or_default()
            .entry(record.window_index)
            .or_default()
            .insert(record.pane_index, record);
    }

    let mut sessions: Vec<Session> = grouped
        .into_iter()
        .filter_map(|(name, windows)| build_session(name, windows))
        .collect();

    sessions.sort_by_key(|s| Reverse(s.last_attached));
    if sessions.len() > 1 {
        sessions.rotate_left(1);
    }

    Ok(sessions)
}

fn build_session(
    name: String,
    windows: BTreeMap<u32, BTreeMap<u32, PaneRecord>>,
) -> Option<Session> {
    let first = windows.values().flat_map(|panes| panes.values()).next()?;
    let mut session = Session {
        id: first.session_id.clone(),
        name,
        attached: first.session_attached,
        last_attached: first.last_attached,
        windows: Vec::with_capacity(windows.len()),
        directory: None,
    };

    for (index, panes) in windows {
        let Some(head) = panes.values().next() else {
            continue;
        };
        let mut window = Window {
            id: head.window_id.clone(),
            index,
            name: head.window_name.clone(),
            active: head.window_active,
            panes: Vec::with_capacity(panes.len()),
        };
        for (pane_index, record) in panes {
            window.panes.push(Pane {
                id: record.pane_id,
                index: pane_index,
                current_command: record.current_command,
                active: record.pane_active,
                snapshot: None,
            });
        }
        session.windows.push(window);
    }

    Some(session)
}
