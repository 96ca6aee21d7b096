//! Lock definitions and observability snapshots

use serde::{Deserialize, Serialize};

/// Capacity used when a lock definition does not specify one
pub const DEFAULT_LOCK_CAPACITY: usize = 1;

fn default_capacity() -> usize {
    DEFAULT_LOCK_CAPACITY
}

/// A configured lock: its name and the maximum number of simultaneous holders
///
/// Also reads the `LockType`/`LockLimit` spelling of older configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDefinition {
    #[serde(alias = "LockType", alias = "locktype")]
    pub name: String,
    #[serde(default = "default_capacity", alias = "LockLimit", alias = "locklimit")]
    pub capacity: usize,
}

impl LockDefinition {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }

    /// A mutual-exclusion lock (capacity 1)
    pub fn exclusive(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_LOCK_CAPACITY)
    }
}

/// Point-in-time view of one slot set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub name: String,
    pub capacity: usize,
    pub holders: usize,
    pub waiters: usize,
}
