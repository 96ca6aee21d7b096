//! TCP client for the lock service

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use lockd_api::{CodecError, Packet, PacketType, read_packet, write_packet};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Default lock server address
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:9527";

/// Default connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Configuration for a lock client
#[derive(Debug, Clone)]
pub struct LockClientConfig {
    /// Server address (host:port)
    pub server_addr: String,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for LockClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl LockClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }
}

/// A connection to the lock server
///
/// Locks are granted to the connection, so everything acquired through this
/// client is released when it is closed or dropped. After a lock request
/// fails or times out the connection state is unknown and the client refuses
/// further requests.
pub struct LockClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    server_addr: SocketAddr,
    held: Vec<String>,
    broken: bool,
}

impl LockClient {
    /// Connect with default settings
    pub async fn connect(server_addr: impl Into<String>) -> Result<Self> {
        Self::connect_with(LockClientConfig::new(server_addr)).await
    }

    pub async fn connect_with(config: LockClientConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&config.server_addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        stream.set_nodelay(true)?;

        let server_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        debug!(server = %server_addr, "Connected to lock server");

        Ok(Self {
            reader,
            writer,
            server_addr,
            held: Vec::new(),
            broken: false,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Locks granted on this connection, in grant order
    pub fn held_locks(&self) -> &[String] {
        &self.held
    }

    /// Send a liveness check; the server does not answer it
    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_usable()?;
        write_packet(&mut self.writer, &Packet::test()).await?;
        Ok(())
    }

    /// Request `name` and wait, without a deadline, until it is granted
    pub async fn lock(&mut self, name: &str) -> Result<()> {
        self.ensure_usable()?;

        let result = self.request(name).await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    /// Like [`lock`](Self::lock), giving up after `timeout`
    pub async fn lock_timeout(&mut self, name: &str, timeout: Duration) -> Result<()> {
        self.ensure_usable()?;

        match tokio::time::timeout(timeout, self.request(name)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.broken = true;
                Err(e)
            }
            Err(_) => {
                self.broken = true;
                Err(ClientError::Timeout(name.to_string()))
            }
        }
    }

    /// Close the connection, releasing every held lock
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        if !self.held.is_empty() {
            info!(server = %self.server_addr, locks = ?self.held, "Released locks");
        }
        Ok(())
    }

    async fn request(&mut self, name: &str) -> Result<()> {
        write_packet(&mut self.writer, &Packet::lock_request(name)).await?;

        match read_packet(&mut self.reader).await {
            Ok(Some(packet)) if packet.kind == PacketType::Lock && packet.is_ack() => {
                debug!(lock = %name, "Lock granted");
                self.held.push(name.to_string());
                Ok(())
            }
            Ok(Some(packet)) => Err(ClientError::UnexpectedResponse(packet)),
            Ok(None) => Err(ClientError::NotGranted(name.to_string())),
            Err(CodecError::Io(e)) if is_disconnect(&e) => {
                Err(ClientError::NotGranted(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.broken {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}
