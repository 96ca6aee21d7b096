//! TCP listener for the lock service
//!
//! Accepts connections indefinitely and runs one [`ConnectionHandler`] task per
//! connection. Acceptance is unconditional; only the slot sets limit
//! concurrency. Each task runs behind an error boundary so that a fault in one
//! connection closes that connection only.

use std::any::Any;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn};

use crate::connection::{SessionInfo, SessionTable};
use crate::handler::{CloseReason, ConnectionHandler};
use crate::registry::LockRegistry;
use crate::session::Session;
use crate::socket::SocketOptions;
use crate::stats::ConnectionStats;

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Lock service listener
pub struct LockServer {
    listener: TcpListener,
    registry: Arc<LockRegistry>,
    stats: Arc<ConnectionStats>,
    sessions: Arc<SessionTable>,
    socket_options: SocketOptions,
}

impl LockServer {
    /// Bind the listener; failures here are start-up errors
    pub async fn bind<A: ToSocketAddrs>(addr: A, registry: Arc<LockRegistry>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, registry))
    }

    pub fn from_listener(listener: TcpListener, registry: Arc<LockRegistry>) -> Self {
        Self {
            listener,
            registry,
            stats: Arc::new(ConnectionStats::new()),
            sessions: Arc::new(SessionTable::new()),
            socket_options: SocketOptions::default(),
        }
    }

    /// Options applied to each accepted socket
    pub fn with_socket_options(mut self, socket_options: SocketOptions) -> Self {
        self.socket_options = socket_options;
        self
    }

    pub fn socket_options(&self) -> SocketOptions {
        self.socket_options
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<LockRegistry> {
        self.registry.clone()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.stats.clone()
    }

    pub fn sessions(&self) -> Arc<SessionTable> {
        self.sessions.clone()
    }

    /// Accept connections forever
    pub async fn serve(self) {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// On shutdown the listener stops accepting and every slot set is closed,
    /// waking connections still waiting for a lock.
    pub async fn serve_with_shutdown<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match self.local_addr() {
            Ok(addr) => info!("Lock server listening on {}", addr),
            Err(e) => warn!(error = %e, "Lock server listening on unknown address"),
        }

        tokio::pin!(shutdown);
        let mut next_session_id: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.spawn_connection(next_session_id, stream, peer);
                        next_session_id += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.registry.close_all();

        let snapshot = self.stats.snapshot();
        info!(
            current_connections = snapshot.current,
            max_connections = snapshot.max,
            total_connections = snapshot.total,
            "Lock server stopped"
        );
    }

    fn spawn_connection(&self, session_id: u64, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = self.socket_options.apply(&stream) {
            warn!(session_id, peer = %peer, error = %e, "Failed to set socket options");
        }

        let current = self.stats.on_open();
        info!(
            session_id,
            peer = %peer,
            current_connections = current,
            total_connections = self.stats.total(),
            "Accepted client"
        );

        self.sessions.register(SessionInfo::new(session_id, peer));
        let guard = ConnectionGuard {
            session_id,
            stats: self.stats.clone(),
            sessions: self.sessions.clone(),
        };

        let registry = self.registry.clone();
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let (reader, writer) = stream.into_split();
            let handler = ConnectionHandler::new(
                Session::new(session_id, peer),
                reader,
                writer,
                registry,
                sessions,
            );

            if let Some(reason) = run_guarded(session_id, peer, handler.run()).await {
                log_close(session_id, peer, &reason);
            }
        });
    }
}

/// Run one connection's future, converting a panic into a logged closure
///
/// Returns `None` if the future panicked. Anything the future owned, including
/// its session, is dropped and therefore released.
pub async fn run_guarded<F>(session_id: u64, peer: SocketAddr, connection: F) -> Option<CloseReason>
where
    F: Future<Output = CloseReason>,
{
    match AssertUnwindSafe(connection).catch_unwind().await {
        Ok(reason) => Some(reason),
        Err(panic) => {
            error!(
                session_id,
                peer = %peer,
                panic = %panic_message(panic.as_ref()),
                "Connection task panicked, closing connection"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

fn log_close(session_id: u64, peer: SocketAddr, reason: &CloseReason) {
    if reason.is_graceful() {
        info!(session_id, peer = %peer, reason = %reason, "Client disconnected");
    } else {
        warn!(session_id, peer = %peer, reason = %reason, "Closing client");
    }
}

// Keeps the connection counters and the session table in step with the task,
// including when the task unwinds.
struct ConnectionGuard {
    session_id: u64,
    stats: Arc<ConnectionStats>,
    sessions: Arc<SessionTable>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.sessions.unregister(self.session_id);
        let current = self.stats.on_close();
        debug!(
            session_id = self.session_id,
            current_connections = current,
            "Connection finished"
        );
    }
}
