//! Common test utilities for integration testing
//!
//! - TestServer: an in-process lock server started from a temporary config file
//! - RawConnection: a bare protocol connection for wire-level assertions

#[allow(dead_code, unused_imports)]
pub mod server;

pub use server::{RawConnection, TestServer};

/// Locks configured by [`TestServer::start`]
pub const DEFAULT_LOCKS_YAML: &str = "\
locks:
  - name: printer
  - name: pool
    capacity: 2
";
