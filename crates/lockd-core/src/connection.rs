use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Observable summary of a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: u64,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub held_locks: Vec<String>,
}

impl SessionInfo {
    pub fn new(session_id: u64, peer: SocketAddr) -> Self {
        Self {
            session_id,
            peer,
            connected_at: Utc::now(),
            held_locks: Vec::new(),
        }
    }
}

/// Live sessions keyed by session id
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<u64, SessionInfo>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, info: SessionInfo) {
        self.sessions.insert(info.session_id, info);
    }

    pub fn unregister(&self, session_id: u64) -> Option<SessionInfo> {
        self.sessions.remove(&session_id).map(|(_, info)| info)
    }

    pub fn record_hold(&self, session_id: u64, lock: &str) {
        if let Some(mut info) = self.sessions.get_mut(&session_id) {
            info.held_locks.push(lock.to_string());
        }
    }

    pub fn get(&self, session_id: u64) -> Option<SessionInfo> {
        self.sessions.get(&session_id).map(|info| info.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of the live sessions holding `lock`, ascending
    pub fn holders_of(&self, lock: &str) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .sessions
            .iter()
            .filter(|entry| entry.held_locks.iter().any(|held| held == lock))
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All live sessions ordered by session id
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        sessions.sort_by_key(|info| info.session_id);
        sessions
    }
}
