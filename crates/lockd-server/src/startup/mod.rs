//! Server start-up: logging, panic reporting, shutdown and listener assembly

pub mod logging;
pub mod panic;
pub mod shutdown;

use std::sync::Arc;

use anyhow::Context;
use lockd_core::LockServer;
use tracing::info;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use panic::install_panic_hook;
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};

use crate::model::Configuration;

/// Build the lock registry from the configuration and bind the listener
pub async fn build_server(configuration: &Configuration) -> anyhow::Result<LockServer> {
    let registry = Arc::new(configuration.lock_registry()?);
    for status in registry.snapshot() {
        info!(lock = %status.name, capacity = status.capacity, "Lock configured");
    }

    let bind_address = configuration.bind_address()?;
    let server = LockServer::bind(bind_address.as_str(), registry)
        .await
        .with_context(|| format!("failed to listen on {}", bind_address))?
        .with_socket_options(configuration.socket_options()?);

    Ok(server)
}
