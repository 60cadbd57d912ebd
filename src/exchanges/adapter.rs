use serde_json::Value;

use crate::orderbook::OrderBook;
use crate::schema::Quote;
use crate::util::json_f64;

/// Outcome of handing one raw websocket frame to an adapter.
///
/// IMPORTANT:
/// - `Market` is the only outcome that triggers a Quote emission
/// - This enum must remain stable across the project
/// - Adding a new variant requires changes in:
///   - the runner dispatch
///   - all exchange adapters
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// Market data was decoded; the runner should emit a Quote.
    Market,
    /// Heartbeat / subscribe ack / unknown frame; nothing to emit.
    Control,
    /// Frame was not valid JSON; skipped.
    Error,
}

/// ExchangeAdapter is the core abstraction layer between:
/// - The generic feed runner (connection + subscription lifecycle)
/// - Exchange-specific WebSocket APIs
///
/// Each adapter owns the decode state for exactly one (exchange,
/// instrument) stream: its L2 orderbook and the most recently cached best
/// bid / best ask / last traded price.
///
/// DESIGN:
/// - Zero exchange-specific logic outside adapters
/// - One adapter instance per (exchange, instrument) stream
/// - The runner owns all I/O; adapters only decode and cache
///
/// THREAD SAFETY:
/// - Must be Send
/// - Instances are never shared; each lives on exactly one feed task
///
pub trait ExchangeAdapter: Send {
    /// Returns the canonical exchange name.
    ///
    /// CONTRACT:
    /// - Must match the lowercase identifiers accepted by configuration
    /// - Used for:
    ///   - Logging
    ///   - MarketKey construction
    ///   - Topic routing (`state.<exchange>.<instrument>`)
    ///
    /// EXAMPLES:
    /// - "binance"
    /// - "bybit"
    ///
    fn name(&self) -> &'static str;

    /// Returns the WebSocket endpoint URL for this exchange.
    ///
    /// NOTES:
    /// - Must be a full WebSocket URL (wss://…)
    /// - No query parameters should be included here
    ///
    fn ws_url(&self) -> &'static str;

    /// The instrument symbol this adapter was constructed for.
    fn instrument(&self) -> &str;

    /// Builds the subscription message sent once per connection.
    ///
    /// RESPONSIBILITIES:
    /// - Apply the exchange-specific payload format
    /// - Respect the snapped orderbook depth
    ///
    /// MUST NOT:
    /// - Perform network I/O
    /// - Mutate adapter state
    ///
    /// RETURNS:
    /// - A serde_json::Value representing the WS subscribe message
    ///
    fn subscribe_message(&self) -> Value;

    /// Application-level keepalive frame, if the exchange requires one.
    ///
    /// NOTES:
    /// - Protocol-level pings are answered by the runner regardless
    /// - Returning `None` disables application-level pings
    ///
    fn ping_message(&self) -> Option<String> {
        None
    }

    /// Decodes one text frame, mutating the book and quote caches.
    ///
    /// IMPORTANT:
    /// - This function must NEVER panic
    /// - Malformed frames are skipped (`Error`)
    /// - Numeric parse failures on individual fields preserve the
    ///   previously cached value
    ///
    /// PERFORMANCE:
    /// - Called on every incoming WS message
    /// - Must be allocation-aware
    ///
    fn handle_frame(&mut self, raw: &str) -> ParseResult;

    /// The L2 book maintained by this feed.
    ///
    /// CONTRACT:
    /// - Reflects every update processed so far, including the frame just
    ///   handled
    ///
    fn book(&self) -> &OrderBook;

    /// Quote assembled from the cached values.
    ///
    /// PARAMETERS:
    /// - `ts_ms`: local wall-clock stamp applied to the quote
    ///
    /// RETURNS:
    /// - The most recently cached best bid / best ask / last price
    ///
    fn quote(&self, ts_ms: i64) -> Quote;
}

/// Parse a `[[price, qty], ...]` array into levels.
///
/// NOTES:
/// - Accepts prices/quantities as numbers or numeric strings
/// - Entries that are not two-element arrays of numerics are dropped
///
pub(crate) fn parse_levels(v: Option<&Value>) -> Vec<(f64, f64)> {
    let Some(arr) = v.and_then(|x| x.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|lvl| {
            let lvl = lvl.as_array()?;
            let px = json_f64(lvl.first()?)?;
            let qty = json_f64(lvl.get(1)?)?;
            Some((px, qty))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn levels_tolerate_strings_and_garbage() {
        let v = json!([["100.5", "1.5"], [99.0, 2.0], ["bad", "1"], ["98"], 7]);
        let lvls = parse_levels(Some(&v));
        assert_eq!(lvls, vec![(100.5, 1.5), (99.0, 2.0)]);
    }

    #[test]
    fn missing_side_is_empty() {
        assert!(parse_levels(None).is_empty());
        assert!(parse_levels(Some(&json!("x"))).is_empty());
    }
}
