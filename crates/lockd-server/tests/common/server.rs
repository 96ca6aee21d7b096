//! Test server management for integration tests

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lockd_api::{Packet, read_packet, write_packet};
use lockd_client::LockClient;
use lockd_core::{ConnectionStats, LockRegistry, SessionTable};
use lockd_server::Configuration;
use lockd_server::startup::{ShutdownSignal, build_server};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::DEFAULT_LOCKS_YAML;

/// How long polling helpers wait before failing the test
const WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// A lock server running inside the test process on an ephemeral port
pub struct TestServer {
    addr: SocketAddr,
    registry: Arc<LockRegistry>,
    stats: Arc<ConnectionStats>,
    sessions: Arc<SessionTable>,
    shutdown: ShutdownSignal,
    handle: Option<JoinHandle<()>>,
    _config_file: NamedTempFile,
}

impl TestServer {
    /// Start with the `printer` (capacity 1) and `pool` (capacity 2) locks
    pub async fn start() -> Self {
        Self::start_with_locks(DEFAULT_LOCKS_YAML).await
    }

    pub async fn start_with_locks(locks_yaml: &str) -> Self {
        let yaml = format!(
            "server:\n  address: 127.0.0.1\n  port: 0\n  cpu: 2\nlogging:\n  console: false\n  file: false\n{}",
            locks_yaml
        );
        let mut config_file = tempfile::Builder::new()
            .prefix("lockd-test")
            .suffix(".yml")
            .tempfile()
            .unwrap();
        config_file.write_all(yaml.as_bytes()).unwrap();

        let configuration = Configuration::load(config_file.path()).unwrap();
        let server = build_server(&configuration).await.unwrap();

        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let stats = server.stats();
        let sessions = server.sessions();

        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(server.serve_with_shutdown(shutdown.recv()));

        Self {
            addr,
            registry,
            stats,
            sessions,
            shutdown,
            handle: Some(handle),
            _config_file: config_file,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn holders(&self, lock: &str) -> usize {
        self.registry.lookup(lock).unwrap().holders()
    }

    pub async fn client(&self) -> LockClient {
        LockClient::connect(self.addr.to_string()).await.unwrap()
    }

    pub async fn raw(&self) -> RawConnection {
        RawConnection::connect(self.addr).await
    }

    pub async fn wait_for_holders(&self, lock: &str, expected: usize) {
        let slots = self.registry.lookup(lock).unwrap();
        wait_until(&format!("{} holders of {}", expected, lock), || {
            slots.holders() == expected
        })
        .await;
    }

    pub async fn wait_for_waiters(&self, lock: &str, expected: usize) {
        let slots = self.registry.lookup(lock).unwrap();
        wait_until(&format!("{} waiters on {}", expected, lock), || {
            slots.waiters() == expected
        })
        .await;
    }

    pub async fn wait_for_connections(&self, expected: usize) {
        let stats = self.stats.clone();
        wait_until(&format!("{} open connections", expected), || {
            stats.current() == expected
        })
        .await;
    }

    /// Trigger shutdown and wait for the accept loop to finish
    pub async fn stop(mut self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(WAIT_TIMEOUT, handle)
                .await
                .expect("server did not stop")
                .unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {}", what);
}

/// A client connection speaking the wire protocol directly
pub struct RawConnection {
    stream: TcpStream,
}

impl RawConnection {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();
        Self { stream }
    }

    pub async fn send(&mut self, packet: &Packet) {
        write_packet(&mut self.stream, packet).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Next packet, or `None` once the server closed the connection
    pub async fn recv(&mut self) -> Option<Packet> {
        tokio::time::timeout(WAIT_TIMEOUT, read_packet(&mut self.stream))
            .await
            .expect("no response from server")
            .ok()
            .flatten()
    }

    /// Assert nothing arrives within `window`
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, read_packet(&mut self.stream)).await;
        assert!(result.is_err(), "unexpected response: {:?}", result);
    }

    /// Request `lock` and assert it is granted
    pub async fn lock(&mut self, lock: &str) {
        self.send(&Packet::lock_request(lock)).await;
        let reply = self.recv().await.expect("connection closed instead of ack");
        assert!(reply.is_ack(), "expected ack, got {:?}", reply);
    }

    /// Assert the server closed the connection without replying
    pub async fn expect_closed(&mut self) {
        assert_eq!(self.recv().await, None);
    }

    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
