// Metric descriptions for the lock server
// The lock engine records these; an installed recorder decides where they go

use metrics::{Unit, describe_counter, describe_gauge};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Connection metrics
    describe_gauge!(
        "lockd_connections_current",
        Unit::Count,
        "Number of currently open client connections"
    );
    describe_gauge!(
        "lockd_connections_max",
        Unit::Count,
        "Highest number of simultaneously open client connections"
    );
    describe_counter!(
        "lockd_connections_total",
        Unit::Count,
        "Total number of accepted client connections"
    );

    // Lock metrics, labelled by lock name
    describe_counter!(
        "lockd_lock_acquired_total",
        Unit::Count,
        "Total number of granted lock slots"
    );
    describe_counter!(
        "lockd_lock_released_total",
        Unit::Count,
        "Total number of released lock slots"
    );
    describe_counter!(
        "lockd_lock_rejected_total",
        Unit::Count,
        "Total number of requests for undefined lock names"
    );
    describe_gauge!(
        "lockd_lock_waiters",
        Unit::Count,
        "Number of connections waiting for a lock slot"
    );

    tracing::info!("Metrics initialized");
}
