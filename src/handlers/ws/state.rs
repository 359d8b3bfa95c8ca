//! Per-connection WebSocket state.

use std::collections::HashSet;

use parking_lot::Mutex;
use uuid::Uuid;

/// Sessions owned by one client connection.
///
/// A connection usually carries a single turn at a time, but the protocol
/// allows several; raw binary audio frames are only routable when exactly
/// one session is live.
#[derive(Debug, Default)]
pub struct ConnectionState {
    sessions: Mutex<HashSet<Uuid>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, id: Uuid) {
        self.sessions.lock().insert(id);
    }

    pub fn remove_session(&self, id: &Uuid) -> bool {
        self.sessions.lock().remove(id)
    }

    /// The session a raw binary frame belongs to, when unambiguous.
    pub fn sole_session(&self) -> Option<Uuid> {
        let sessions = self.sessions.lock();
        if sessions.len() == 1 {
            sessions.iter().next().copied()
        } else {
            None
        }
    }

    /// Drain all owned sessions, e.g. on disconnect.
    pub fn take_sessions(&self) -> Vec<Uuid> {
        self.sessions.lock().drain().collect()
    }
}
