/// Collector module
///
/// Groups the runtime responsible for:
/// - Spawning one websocket feed task per (exchange, instrument)
/// - Connection and subscription lifecycle, including reconnects
/// - Routing decoded quotes into the market-data aggregator
///
/// Exchange-specific decoding lives in the adapters; this layer stays
/// orchestration-only.
pub mod runner;
