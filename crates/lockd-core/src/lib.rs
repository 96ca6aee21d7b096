//! lockd Core - named-lock coordination engine
//!
//! This crate provides:
//! - The lock registry: one bounded slot set per configured lock name
//! - Per-connection sessions that tie lock ownership to connection lifetime
//! - The connection handler driving the request/response protocol
//! - The TCP listener with connection statistics and a live session table
//! - Keepalive and linger options for accepted sockets

pub mod connection;
pub mod error;
pub mod handler;
pub mod model;
pub mod registry;
pub mod server;
pub mod session;
pub mod socket;
pub mod stats;

// Re-export commonly used types
pub use connection::{SessionInfo, SessionTable};
pub use error::{LockError, RegistryError};
pub use handler::{CloseReason, ConnectionHandler};
pub use model::{DEFAULT_LOCK_CAPACITY, LockDefinition, LockStatus};
pub use registry::{LockRegistry, SlotSet};
pub use server::LockServer;
pub use session::{Session, SessionState};
pub use socket::{DEFAULT_KEEPALIVE, SocketOptions};
pub use stats::{ConnectionSnapshot, ConnectionStats};
