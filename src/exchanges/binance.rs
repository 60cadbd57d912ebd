use serde_json::{Value, json};

use crate::orderbook::OrderBook;
use crate::schema::Quote;
use crate::util::json_f64;

use super::adapter::{ExchangeAdapter, ParseResult, parse_levels};

/// Binance spot websocket feed.
///
/// Streams per instrument:
/// - `<sym>@ticker`        24hrTicker, carries the last traded price (`c`)
/// - `<sym>@depth<N>@100ms` partial book, treated as a fresh top-N snapshot
/// - `<sym>@bookTicker`     best bid / ask as scalar strings
pub struct BinanceFeed {
    instrument: String,
    sym_lc: String,
    depth: u32,

    book: OrderBook,
    spot: f64,
    best_bid: f64,
    best_ask: f64,
}

/// Snap a requested depth to the nearest Binance partial-book depth.
pub fn snap_depth(requested: u32) -> u32 {
    if requested <= 5 {
        5
    } else if requested <= 10 {
        10
    } else {
        20
    }
}

impl BinanceFeed {
    pub fn new(instrument: &str, requested_depth: u32) -> Self {
        Self {
            instrument: instrument.to_string(),
            sym_lc: instrument.to_lowercase(),
            depth: snap_depth(requested_depth),
            book: OrderBook::new(),
            spot: 0.0,
            best_bid: 0.0,
            best_ask: 0.0,
        }
    }
}

impl ExchangeAdapter for BinanceFeed {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn ws_url(&self) -> &'static str {
        "wss://stream.binance.com:9443/ws"
    }

    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn subscribe_message(&self) -> Value {
        json!({
            "method": "SUBSCRIBE",
            "params": [
                format!("{}@ticker", self.sym_lc),
                format!("{}@depth{}@100ms", self.sym_lc, self.depth),
                format!("{}@bookTicker", self.sym_lc),
            ],
            "id": 1
        })
    }

    fn handle_frame(&mut self, raw: &str) -> ParseResult {
        let msg: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return ParseResult::Error,
        };

        // Subscribe ack: { "result": null, "id": 1 }
        if msg.get("result").is_some() {
            return ParseResult::Control;
        }

        let event = msg.get("e").and_then(|e| e.as_str());
        let mut market = false;

        // 24hrTicker: last traded price in "c" (string).
        if event == Some("24hrTicker") {
            if let Some(c) = msg.get("c").and_then(json_f64) {
                self.spot = c;
            }
            market = true;
        }

        // bookTicker: scalar "b"/"a" without an "e" field. depthUpdate also
        // carries "b"/"a" but always with "e", so it never lands here.
        if event.is_none() && msg.get("b").is_some() && msg.get("a").is_some() {
            if let Some(b) = msg.get("b").and_then(json_f64) {
                self.best_bid = b;
            }
            if let Some(a) = msg.get("a").and_then(json_f64) {
                self.best_ask = a;
            }
            market = true;
        }

        // depthUpdate: level arrays in "b"/"a". The subscribed stream is a
        // partial-book view, so each frame is a full top-N snapshot.
        if event == Some("depthUpdate") {
            let bids = parse_levels(msg.get("b"));
            let asks = parse_levels(msg.get("a"));
            self.book.apply_snapshot(&bids, &asks);
            market = true;
        }

        // depth<N> snapshot shape: { "lastUpdateId": .., "bids": [..], "asks": [..] }
        if msg.get("lastUpdateId").is_some()
            && msg.get("bids").is_some()
            && msg.get("asks").is_some()
        {
            let bids = parse_levels(msg.get("bids"));
            let asks = parse_levels(msg.get("asks"));
            self.book.apply_snapshot(&bids, &asks);
            market = true;
        }

        if market {
            ParseResult::Market
        } else {
            ParseResult::Control
        }
    }

    fn book(&self) -> &OrderBook {
        &self.book
    }

    fn quote(&self, ts_ms: i64) -> Quote {
        Quote {
            exchange: self.name().to_string(),
            instrument: self.instrument.clone(),
            bid: self.best_bid,
            ask: self.best_ask,
            spot: self.spot,
            ts_ms,
        }
    }
}
