//! Socket options for accepted connections
//!
//! Keepalive lets the server notice holders whose host crashed or dropped off
//! the network, so their slots are released without a FIN ever arriving.

use std::io;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// Idle time before keepalive starts checking the peer
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);

/// Options applied to every accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub nodelay: bool,
    /// Keepalive idle time; `None` leaves keepalive off
    pub keepalive: Option<Duration>,
    /// `SO_LINGER`; zero resets the connection on close instead of lingering
    pub linger: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: Some(DEFAULT_KEEPALIVE),
            linger: Some(Duration::ZERO),
        }
    }
}

impl SocketOptions {
    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        let socket = SockRef::from(stream);
        if let Some(idle) = self.keepalive {
            socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        }
        socket.set_linger(self.linger)?;
        Ok(())
    }
}
