// Connection statistics for observability
// Lock-free counters updated by the listener and every connection task

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use metrics::{counter, gauge};
use serde::Serialize;
use tracing::info;

/// Point-in-time copy of the connection counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionSnapshot {
    pub current: usize,
    pub max: usize,
    pub total: u64,
}

/// Current, historical maximum and total accepted connection counts
///
/// Only the listener mutates these; everyone else gets read access.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    current: AtomicUsize,
    max: AtomicUsize,
    total: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections open right now
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections seen so far
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    /// Connections accepted since start-up
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            current: self.current(),
            max: self.max(),
            total: self.total(),
        }
    }

    /// Count a newly accepted connection; returns the new current count
    pub(crate) fn on_open(&self) -> usize {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let previous_max = self.max.fetch_max(current, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);

        gauge!("lockd_connections_current").set(current as f64);
        counter!("lockd_connections_total").increment(1);
        if current > previous_max {
            gauge!("lockd_connections_max").set(current as f64);
            info!(max_connections = current, "New maximum of concurrent connections");
        }

        current
    }

    /// Count a closed connection; returns the new current count
    pub(crate) fn on_close(&self) -> usize {
        let current = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)))
            .map(|previous| previous.saturating_sub(1))
            .unwrap_or_default();
        gauge!("lockd_connections_current").set(current as f64);
        current
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_open_close() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.on_open(), 1);
        assert_eq!(stats.on_open(), 2);
        assert_eq!(stats.on_close(), 1);
        assert_eq!(stats.on_open(), 2);
        assert_eq!(stats.on_close(), 1);
        assert_eq!(stats.on_close(), 0);

        assert_eq!(
            stats.snapshot(),
            ConnectionSnapshot {
                current: 0,
                max: 2,
                total: 3,
            }
        );
    }

    #[test]
    fn test_close_never_underflows() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.on_close(), 0);
        assert_eq!(stats.current(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(ConnectionStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.on_open();
                        stats.on_close();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.current(), 0);
        assert_eq!(stats.total(), 8000);
        assert!(stats.max() >= 1 && stats.max() <= 8);
    }
}
