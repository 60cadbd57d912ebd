use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use once_cell::sync::Lazy;

/// Global runtime metrics for the data-plane process.
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // WebSocket level
    pub ws_connections_active: AtomicUsize,
    pub ws_reconnects: AtomicUsize,

    // Feed decoding
    pub frames_received: AtomicUsize,
    pub parse_errors: AtomicUsize,
    pub quotes_emitted: AtomicUsize,

    // Fan-out
    pub snapshots_published: AtomicUsize,
    pub publish_drops: AtomicUsize,
    pub subscribers_active: AtomicUsize,

    // Persistence
    pub db_rows_written: AtomicUsize,
    pub db_batches: AtomicUsize,
    pub db_drops: AtomicUsize,
    pub db_commit_errors: AtomicUsize,
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
