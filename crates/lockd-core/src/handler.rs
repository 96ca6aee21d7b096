//! Connection handler
//!
//! Drives one session through its request loop:
//!
//! ```text
//! Connected -> AwaitingRequest -> Acquiring -> Holding -> AwaitingRequest ... -> Closed
//! ```
//!
//! Lock requests for configured names suspend this connection only until a
//! slot frees up; unknown names, protocol errors and transport errors close the
//! connection. Whatever the session holds is released when the handler ends.

use std::sync::Arc;

use bytes::BytesMut;
use lockd_api::{CodecError, Decoded, Packet, PacketType, decode_frame, write_packet};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::connection::SessionTable;
use crate::error::LockError;
use crate::registry::{LockRegistry, SlotSet};
use crate::session::{Session, SessionState};

/// Why a connection was closed
#[derive(Debug, thiserror::Error)]
pub enum CloseReason {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("lock '{0}' is not configured")]
    UnknownLock(String),

    #[error("protocol error: {0}")]
    Protocol(CodecError),

    #[error("transport error: {0}")]
    Transport(std::io::Error),

    #[error("lock '{0}' was closed during shutdown")]
    Shutdown(String),
}

impl CloseReason {
    /// Whether the closure is part of normal operation rather than a fault
    pub fn is_graceful(&self) -> bool {
        matches!(self, CloseReason::PeerClosed | CloseReason::Shutdown(_))
    }
}

impl From<CodecError> for CloseReason {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(io) => CloseReason::Transport(io),
            other => CloseReason::Protocol(other),
        }
    }
}

/// Initial capacity of a connection's receive buffer
const RECEIVE_BUFFER_CAPACITY: usize = 4096;

/// Request loop for one accepted connection
pub struct ConnectionHandler<R, W> {
    session: Session,
    reader: R,
    // Bytes read from the peer but not yet decoded, including requests
    // pipelined while this connection waits for a lock
    received: BytesMut,
    writer: W,
    registry: Arc<LockRegistry>,
    sessions: Arc<SessionTable>,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        session: Session,
        reader: R,
        writer: W,
        registry: Arc<LockRegistry>,
        sessions: Arc<SessionTable>,
    ) -> Self {
        Self {
            session,
            reader,
            received: BytesMut::with_capacity(RECEIVE_BUFFER_CAPACITY),
            writer,
            registry,
            sessions,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve requests until the connection ends, then release everything held
    pub async fn run(mut self) -> CloseReason {
        let reason = self.serve().await;

        let released = self.session.close();
        if let Err(e) = self.writer.shutdown().await {
            debug!(session_id = self.session.id(), error = %e, "Failed to shut down writer");
        }

        debug!(
            session_id = self.session.id(),
            peer = %self.session.peer(),
            released,
            reason = %reason,
            "Session closed"
        );

        reason
    }

    async fn serve(&mut self) -> CloseReason {
        loop {
            self.session.set_state(SessionState::AwaitingRequest);

            let packet = match self.next_packet().await {
                Ok(Some(packet)) => packet,
                Ok(None) => return CloseReason::PeerClosed,
                Err(e) => return e.into(),
            };

            match packet.kind {
                PacketType::Lock => {
                    if let Err(reason) = self.handle_lock_request(packet).await {
                        return reason;
                    }
                }
                PacketType::Test => {
                    debug!(session_id = self.session.id(), "Received test packet");
                }
                PacketType::Unknown(kind) => {
                    debug!(
                        session_id = self.session.id(),
                        kind, "Ignoring packet of unknown type"
                    );
                }
            }
        }
    }

    async fn handle_lock_request(&mut self, packet: Packet) -> Result<(), CloseReason> {
        let name = packet.data;
        let session_id = self.session.id();
        let peer = self.session.peer();

        let Some(slots) = self.registry.lookup(&name) else {
            warn!(session_id, peer = %peer, lock = %name, "Lock is not configured");
            counter!("lockd_lock_rejected_total", "lock" => name.clone()).increment(1);
            return Err(CloseReason::UnknownLock(name));
        };

        self.session.set_state(SessionState::Acquiring);
        info!(
            session_id,
            peer = %peer,
            lock = %name,
            holders = slots.holders(),
            "Waiting for lock"
        );

        self.acquire(&slots).await?;

        self.session.record_hold(name.clone(), slots.clone());
        self.sessions.record_hold(session_id, &name);
        info!(
            session_id,
            peer = %peer,
            lock = %name,
            holders = slots.holders(),
            "Lock acquired"
        );

        write_packet(&mut self.writer, &Packet::ack(packet.kind)).await?;
        Ok(())
    }

    /// Next complete packet; `None` once the peer has closed the stream
    async fn next_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        loop {
            match decode_frame(&mut self.received)? {
                Decoded::Packet(packet) => return Ok(Some(packet)),
                Decoded::EndOfStream => return Ok(None),
                Decoded::Incomplete => {}
            }

            if self.reader.read_buf(&mut self.received).await? == 0 {
                return Ok(None);
            }
        }
    }

    // Wait for a slot while watching the peer for as long as the wait lasts.
    // A peer that goes away first abandons the acquire without taking a slot;
    // anything it sends meanwhile stays in the receive buffer.
    async fn acquire(&mut self, slots: &SlotSet) -> Result<(), CloseReason> {
        let acquire = slots.acquire();
        tokio::pin!(acquire);

        loop {
            tokio::select! {
                biased;
                acquired = &mut acquire => {
                    return acquired
                        .map_err(|_: LockError| CloseReason::Shutdown(slots.name().to_string()));
                }
                read = self.reader.read_buf(&mut self.received) => match read {
                    Ok(0) => {
                        info!(
                            session_id = self.session.id(),
                            lock = %slots.name(),
                            "Peer closed while waiting for lock"
                        );
                        return Err(CloseReason::PeerClosed);
                    }
                    Ok(_) => {}
                    Err(e) => return Err(CloseReason::Transport(e)),
                },
            }
        }
    }
}
