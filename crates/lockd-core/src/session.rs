//! Per-connection session state
//!
//! A session is created when a connection is accepted and lives until the
//! connection closes. Every slot granted to the session is recorded so it can
//! be returned exactly once when the session closes, including when the
//! connection task unwinds or is cancelled.

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::registry::SlotSet;

/// Connection handler states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    AwaitingRequest,
    Acquiring,
    Holding,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connected => "CONNECTED",
            SessionState::AwaitingRequest => "AWAITING_REQUEST",
            SessionState::Acquiring => "ACQUIRING",
            SessionState::Holding => "HOLDING",
            SessionState::Closed => "CLOSED",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A slot granted to a session
#[derive(Debug)]
pub struct HeldLock {
    name: String,
    slots: Arc<SlotSet>,
}

impl HeldLock {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Server-side state of one client connection
#[derive(Debug)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    state: SessionState,
    held: Vec<HeldLock>,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            connected_at: Utc::now(),
            state: SessionState::Connected,
            held: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Names of the locks this session holds, in grant order
    pub fn held_locks(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(HeldLock::name)
    }

    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }

    /// Record a slot that was just acquired on behalf of this session
    pub(crate) fn record_hold(&mut self, name: impl Into<String>, slots: Arc<SlotSet>) {
        self.held.push(HeldLock {
            name: name.into(),
            slots,
        });
        self.state = SessionState::Holding;
    }

    /// Return every held slot and mark the session closed
    ///
    /// Returns the number of slots released. Calling it again releases nothing.
    pub fn close(&mut self) -> usize {
        let released = self.held.len();
        for held in self.held.drain(..) {
            held.slots.release();
            info!(
                session_id = self.id,
                peer = %self.peer,
                lock = %held.name,
                holders = held.slots.holders(),
                "Lock released"
            );
        }
        self.state = SessionState::Closed;
        released
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
