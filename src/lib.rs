// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:      Configuration structs loaded from JSON
// - util:        Shared helpers (time, tolerant numerics, endpoints)
// - metrics:     Process-wide runtime counters
// - schema:      Typed market records and the market_state_v1 payload
// - orderbook:   Ordered L2 depth ladder
// - exchanges:   Exchange feed adapters and adapter registry
// - collector:   Feed runtime (connection + subscription lifecycle)
// - aggregator:  Mutex-protected fusion of feed updates
// - snapshot:    Fixed-cadence sampling loop
// - publisher:   Lossy PUB fan-out bus
// - subscriber:  SUB endpoint with topic filtering and decode
// - store:       SQLite batch writer for sampled state
// - pnl:         Executions/funding/trades ledgers and FIFO reconciler
// - trader:      Imbalance strategy and paper execution engine
//
pub mod aggregator;
pub mod collector;
pub mod config;
pub mod exchanges;
pub mod metrics;
pub mod orderbook;
pub mod pnl;
pub mod publisher;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod subscriber;
pub mod trader;
pub mod util;
