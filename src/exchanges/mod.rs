//! Exchange feed registry and factory
//!
//! This module provides:
//! - Central registration of all supported exchanges
//! - A factory function to build a feed adapter by name
//!
//! All exchange-specific logic must live in dedicated adapter modules.
//! The rest of the application must interact exclusively through the
//! `ExchangeAdapter` trait.

pub mod adapter;
pub mod binance;
pub mod bybit;

use adapter::ExchangeAdapter;

/// Builds a feed adapter for one (exchange, instrument) stream.
///
/// This function acts as the **central factory / registry** for all
/// supported exchanges.
///
/// DESIGN:
/// - Keeps adapter creation in one place
/// - Avoids string-based exchange dispatch scattered across the codebase
/// - Enables compile-time visibility of supported exchanges
///
/// PARAMETERS:
/// - `name`: exchange identifier from configuration
/// - `instrument`: symbol the feed subscribes to
/// - `requested_depth`: snapped per exchange to a supported depth
///
/// RETURNS:
/// - `Some(Box<dyn ExchangeAdapter>)` if the exchange is supported
/// - `None` if the exchange is unknown
///
/// CONTRACT:
/// - `name` MUST match the lowercase identifiers accepted by `Config`
/// - Adapter names must be lowercase and stable
///
/// THREADING:
/// - Each returned adapter is owned by exactly one feed task
///
pub fn make_feed(
    name: &str,
    instrument: &str,
    requested_depth: u32,
) -> Option<Box<dyn ExchangeAdapter>> {
    match name {
        "binance" => Some(Box::new(binance::BinanceFeed::new(
            instrument,
            requested_depth,
        ))),
        "bybit" => Some(Box::new(bybit::BybitFeed::new(instrument, requested_depth))),
        _ => None,
    }
}
