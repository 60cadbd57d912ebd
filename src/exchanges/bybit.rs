use serde_json::{Value, json};

use crate::orderbook::OrderBook;
use crate::schema::Quote;
use crate::util::json_f64;

use super::adapter::{ExchangeAdapter, ParseResult, parse_levels};

/// Bybit v5 spot websocket feed.
///
/// Topics per instrument:
/// - `orderbook.<N>.<SYMBOL>` with `type` snapshot/delta
/// - `tickers.<SYMBOL>` for last price and optional best bid/ask
pub struct BybitFeed {
    instrument: String,
    depth: u32,

    book: OrderBook,
    spot: f64,
    ticker_bid: f64,
    ticker_ask: f64,
}

/// Snap a requested depth to the nearest Bybit orderbook topic depth.
pub fn snap_depth(requested: u32) -> u32 {
    if requested <= 1 {
        1
    } else if requested <= 50 {
        50
    } else if requested <= 200 {
        200
    } else {
        1000
    }
}

impl BybitFeed {
    pub fn new(instrument: &str, requested_depth: u32) -> Self {
        Self {
            instrument: instrument.to_string(),
            depth: snap_depth(requested_depth),
            book: OrderBook::new(),
            spot: 0.0,
            ticker_bid: 0.0,
            ticker_ask: 0.0,
        }
    }

    /// Bybit wraps `data` either as an object or a one-element array.
    fn unwrap_data(data: &Value) -> Option<&Value> {
        if data.is_object() {
            Some(data)
        } else {
            data.as_array().and_then(|a| a.first())
        }
    }
}

impl ExchangeAdapter for BybitFeed {
    fn name(&self) -> &'static str {
        "bybit"
    }

    fn ws_url(&self) -> &'static str {
        "wss://stream.bybit.com/v5/public/spot"
    }

    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn subscribe_message(&self) -> Value {
        json!({
            "op": "subscribe",
            "args": [
                format!("orderbook.{}.{}", self.depth, self.instrument),
                format!("tickers.{}", self.instrument),
            ]
        })
    }

    fn ping_message(&self) -> Option<String> {
        Some(r#"{"op":"ping"}"#.to_string())
    }

    fn handle_frame(&mut self, raw: &str) -> ParseResult {
        let msg: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return ParseResult::Error,
        };

        // Subscribe acks and pongs carry "op".
        if msg.get("op").is_some() {
            return ParseResult::Control;
        }

        let Some(topic) = msg.get("topic").and_then(|t| t.as_str()) else {
            return ParseResult::Control;
        };
        let Some(data) = msg.get("data") else {
            return ParseResult::Control;
        };

        if topic == format!("tickers.{}", self.instrument) {
            let Some(t) = Self::unwrap_data(data) else {
                return ParseResult::Control;
            };

            if let Some(px) = t.get("lastPrice").and_then(json_f64) {
                self.spot = px;
            }
            if let Some(b) = t.get("bid1Price").and_then(json_f64) {
                self.ticker_bid = b;
            }
            if let Some(a) = t.get("ask1Price").and_then(json_f64) {
                self.ticker_ask = a;
            }
            return ParseResult::Market;
        }

        if topic.starts_with("orderbook.") {
            let Some(d) = Self::unwrap_data(data) else {
                return ParseResult::Control;
            };

            let bids = parse_levels(d.get("b"));
            let asks = parse_levels(d.get("a"));

            match msg.get("type").and_then(|t| t.as_str()).unwrap_or("snapshot") {
                "delta" => self.book.apply_delta(&bids, &asks),
                _ => self.book.apply_snapshot(&bids, &asks),
            }
            return ParseResult::Market;
        }

        ParseResult::Control
    }

    fn book(&self) -> &OrderBook {
        &self.book
    }

    fn quote(&self, ts_ms: i64) -> Quote {
        // Prefer the ticker-provided best bid/ask; fall back to the book.
        let bid = if self.ticker_bid > 0.0 {
            self.ticker_bid
        } else {
            self.book.best_bid()
        };
        let ask = if self.ticker_ask > 0.0 {
            self.ticker_ask
        } else {
            self.book.best_ask()
        };

        Quote {
            exchange: self.name().to_string(),
            instrument: self.instrument.clone(),
            bid,
            ask,
            spot: self.spot,
            ts_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_snapping() {
        assert_eq!(snap_depth(0), 1);
        assert_eq!(snap_depth(1), 1);
        assert_eq!(snap_depth(2), 50);
        assert_eq!(snap_depth(50), 50);
        assert_eq!(snap_depth(51), 200);
        assert_eq!(snap_depth(201), 1000);
    }

    #[test]
    fn snapshot_then_delta_dispatch() {
        let mut feed = BybitFeed::new("ETHUSDT", 50);
        let r = feed.handle_frame(
            r#"{"topic":"orderbook.50.ETHUSDT","type":"snapshot",
                "data":{"s":"ETHUSDT","b":[["100","1"],["99","2"]],"a":[["101","3"]],"ts":1}}"#,
        );
        assert_eq!(r, ParseResult::Market);
        assert_eq!(feed.book().best_bid(), 100.0);

        feed.handle_frame(
            r#"{"topic":"orderbook.50.ETHUSDT","type":"delta",
                "data":{"s":"ETHUSDT","b":[["100","0"]],"a":[["101","4"]],"ts":2}}"#,
        );
        assert_eq!(feed.book().best_bid(), 99.0);
        assert_eq!(feed.book().top_n(crate::orderbook::BookSide::Ask, 1), vec![(101.0, 4.0)]);
    }

    #[test]
    fn ticker_updates_quote() {
        let mut feed = BybitFeed::new("ETHUSDT", 50);
        let r = feed.handle_frame(
            r#"{"topic":"tickers.ETHUSDT",
                "data":{"lastPrice":"3160.5","bid1Price":"3160.4","ask1Price":"3160.6"}}"#,
        );
        assert_eq!(r, ParseResult::Market);
        let q = feed.quote(1);
        assert_eq!(q.spot, 3160.5);
        assert_eq!(q.bid, 3160.4);
        assert_eq!(q.ask, 3160.6);
    }

    #[test]
    fn quote_falls_back_to_book_before_first_ticker() {
        let mut feed = BybitFeed::new("ETHUSDT", 50);
        feed.handle_frame(
            r#"{"topic":"orderbook.50.ETHUSDT","type":"snapshot",
                "data":{"b":[["100","1"]],"a":[["101","1"]]}}"#,
        );
        let q = feed.quote(1);
        assert_eq!(q.bid, 100.0);
        assert_eq!(q.ask, 101.0);
    }

    #[test]
    fn data_array_wrapper_accepted() {
        let mut feed = BybitFeed::new("ETHUSDT", 50);
        let r = feed.handle_frame(
            r#"{"topic":"tickers.ETHUSDT","data":[{"lastPrice":"10"}]}"#,
        );
        assert_eq!(r, ParseResult::Market);
        assert_eq!(feed.quote(1).spot, 10.0);
    }

    #[test]
    fn control_frames_ignored() {
        let mut feed = BybitFeed::new("ETHUSDT", 50);
        assert_eq!(
            feed.handle_frame(r#"{"op":"subscribe","success":true}"#),
            ParseResult::Control
        );
        assert_eq!(
            feed.handle_frame(r#"{"topic":"kline.1.ETHUSDT","data":{}}"#),
            ParseResult::Control
        );
        assert_eq!(feed.handle_frame("{{"), ParseResult::Error);
    }
}
