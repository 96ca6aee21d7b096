//! Error types for the lock coordination engine

/// Errors raised while building the lock registry from its definitions
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("lock name must not be empty")]
    EmptyName,

    #[error("lock '{0}' must have a capacity of at least 1")]
    ZeroCapacity(String),

    #[error("lock '{0}' capacity {1} exceeds the supported maximum")]
    CapacityTooLarge(String, usize),

    #[error("lock '{0}' is defined more than once")]
    DuplicateName(String),
}

/// Errors raised by lock operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LockError {
    #[error("lock '{0}' is not configured")]
    UnknownLock(String),

    #[error("lock '{0}' has been closed")]
    Closed(String),
}
