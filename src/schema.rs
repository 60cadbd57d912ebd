//! Strongly typed records shared across the data pipeline.
//!
//! These types flow between:
//! - Exchange feed adapters
//! - The market-data aggregator
//! - The snapshot loop / publisher / SQLite writer
//! - Downstream subscribers (paper trader, live trader)
//!
//! The wire payload (`market_state_v1`) is encoded by `encode_market_state`
//! and decoded by `MarketState::parse`. Encoding is hand-rolled so every
//! numeric field is rendered fixed-point with 8 fractional digits; decoding
//! goes through tolerant numeric extraction so payloads with numeric
//! strings still parse.

use serde_json::Value;

use crate::util::{json_f64, json_i64};

/// Key identifying one market stream: (exchange, instrument).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketKey {
    pub exchange: String,
    pub instrument: String,
}

impl MarketKey {
    pub fn new(exchange: &str, instrument: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            instrument: instrument.to_string(),
        }
    }
}

/// L1 quote emitted by a feed adapter on every decoded market frame.
///
/// `ts_ms` is the local wall-clock time at decode, not the exchange time.
#[derive(Debug, Clone, Default)]
pub struct Quote {
    pub exchange: String,
    pub instrument: String,
    pub bid: f64,
    pub ask: f64,
    /// Last traded price.
    pub spot: f64,
    pub ts_ms: i64,
}

/// Derived per-key feature vector maintained by the aggregator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateVector {
    pub mid: f64,
    pub spread: f64,

    /// Log-returns over ~1 / ~5 / ~10 seconds.
    pub r1: f64,
    pub r5: f64,
    pub r10: f64,

    /// Top-5 depth per side, zero-padded when the book is thinner.
    pub bid_vol: [f64; 5],
    pub ask_vol: [f64; 5],

    /// Placeholder, currently always 0.0.
    pub cross_ex_signal: f64,
}

/// One sampled record: what goes onto the wire and into `market_state`.
///
/// All fields are finite; quantities are non-negative. `ts_ms` is the
/// sampling time, not the source quote time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub exchange: String,
    pub instrument: String,
    pub ts_ms: i64,

    pub mid: f64,
    pub spread: f64,
    pub r1: f64,
    pub r5: f64,
    pub r10: f64,

    /// Retained in the store schema; the emitter writes 0.0 and subscribers
    /// derive imbalance from the depth arrays.
    pub imbalance: f64,
    pub cross_ex_signal: f64,

    pub bid_vol: [f64; 5],
    pub ask_vol: [f64; 5],
}

/// Render a float fixed-point with 8 fractional digits, matching the wire
/// contract for every numeric payload field.
fn f8(x: f64) -> String {
    format!("{:.8}", x)
}

/// Encode one `market_state_v1` payload.
///
/// Field order is part of the contract: schema, exchange, instrument,
/// ts_ms, book_meta, top_of_book, returns, depth, features. The `features`
/// object is reserved and left empty.
pub fn encode_market_state(
    snap: &StateSnapshot,
    bid: f64,
    ask: f64,
    bid_levels: usize,
    ask_levels: usize,
) -> String {
    let mut out = String::with_capacity(512);

    out.push_str("{\"schema\":\"market_state_v1\",");
    out.push_str(&format!("\"exchange\":\"{}\",", snap.exchange));
    out.push_str(&format!("\"instrument\":\"{}\",", snap.instrument));
    out.push_str(&format!("\"ts_ms\":{},", snap.ts_ms));

    out.push_str(&format!(
        "\"book_meta\":{{\"bid_levels\":{},\"ask_levels\":{}}},",
        bid_levels, ask_levels
    ));

    out.push_str(&format!(
        "\"top_of_book\":{{\"bid\":{},\"ask\":{},\"mid\":{},\"spread\":{}}},",
        f8(bid),
        f8(ask),
        f8(snap.mid),
        f8(snap.spread)
    ));

    out.push_str(&format!(
        "\"returns\":{{\"r1\":{},\"r5\":{},\"r10\":{}}},",
        f8(snap.r1),
        f8(snap.r5),
        f8(snap.r10)
    ));

    let vols = |v: &[f64; 5]| -> String {
        v.iter().map(|q| f8(*q)).collect::<Vec<_>>().join(",")
    };
    out.push_str(&format!(
        "\"depth\":{{\"bid_vol\":[{}],\"ask_vol\":[{}]}},",
        vols(&snap.bid_vol),
        vols(&snap.ask_vol)
    ));

    out.push_str("\"features\":{}}");
    out
}

/// Decoded view of a `market_state_v1` payload as seen by subscribers.
///
/// `imbalance` is derived at parse time from the top-5 depth arrays.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    pub schema: String,
    pub exchange: String,
    pub instrument: String,
    pub ts_ms: i64,

    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub spread: f64,

    pub r1: f64,
    pub r5: f64,
    pub r10: f64,

    pub bid_vol: [f64; 5],
    pub ask_vol: [f64; 5],

    pub bid_levels: usize,
    pub ask_levels: usize,

    pub imbalance: f64,
}

impl MarketState {
    /// Key for per-market maps: "exchange|instrument".
    pub fn key(&self) -> String {
        format!("{}|{}", self.exchange, self.instrument)
    }

    /// Parse one payload. Returns `None` for malformed JSON or payloads
    /// missing exchange/instrument; individual missing numeric fields
    /// default to zero so a partial payload still yields a record.
    pub fn parse(payload: &str) -> Option<Self> {
        let v: Value = serde_json::from_str(payload).ok()?;

        let mut s = MarketState {
            schema: v
                .get("schema")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
            exchange: v.get("exchange")?.as_str()?.to_string(),
            instrument: v.get("instrument")?.as_str()?.to_string(),
            ts_ms: v.get("ts_ms").and_then(json_i64).unwrap_or(0),
            ..Default::default()
        };

        if s.exchange.is_empty() || s.instrument.is_empty() {
            return None;
        }

        if let Some(meta) = v.get("book_meta") {
            s.bid_levels = meta
                .get("bid_levels")
                .and_then(json_i64)
                .unwrap_or(0)
                .max(0) as usize;
            s.ask_levels = meta
                .get("ask_levels")
                .and_then(json_i64)
                .unwrap_or(0)
                .max(0) as usize;
        }

        if let Some(tob) = v.get("top_of_book") {
            s.bid = tob.get("bid").and_then(json_f64).unwrap_or(0.0);
            s.ask = tob.get("ask").and_then(json_f64).unwrap_or(0.0);
            s.mid = tob.get("mid").and_then(json_f64).unwrap_or(0.0);
            s.spread = tob.get("spread").and_then(json_f64).unwrap_or(0.0);
        }

        if let Some(r) = v.get("returns") {
            s.r1 = r.get("r1").and_then(json_f64).unwrap_or(0.0);
            s.r5 = r.get("r5").and_then(json_f64).unwrap_or(0.0);
            s.r10 = r.get("r10").and_then(json_f64).unwrap_or(0.0);
        }

        if let Some(d) = v.get("depth") {
            let fill = |dst: &mut [f64; 5], src: Option<&Value>| {
                if let Some(arr) = src.and_then(|x| x.as_array()) {
                    for (i, lvl) in arr.iter().take(5).enumerate() {
                        dst[i] = json_f64(lvl).unwrap_or(0.0);
                    }
                }
            };
            fill(&mut s.bid_vol, d.get("bid_vol"));
            fill(&mut s.ask_vol, d.get("ask_vol"));
        }

        let bid_sum: f64 = s.bid_vol.iter().sum();
        let ask_sum: f64 = s.ask_vol.iter().sum();
        s.imbalance = (bid_sum - ask_sum) / (bid_sum + ask_sum + 1e-9);

        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> StateSnapshot {
        StateSnapshot {
            exchange: "binance".into(),
            instrument: "ETHUSDT".into(),
            ts_ms: 1700000000123,
            mid: 3163.15,
            spread: 0.1,
            r1: 0.00012345,
            r5: -0.0004,
            r10: 0.0021,
            imbalance: 0.0,
            cross_ex_signal: 0.0,
            bid_vol: [1.5, 2.0, 0.25, 0.0, 0.0],
            ask_vol: [3.0, 1.0, 0.5, 0.125, 0.0625],
        }
    }

    #[test]
    fn payload_round_trips_byte_identical() {
        let snap = sample_snapshot();
        let first = encode_market_state(&snap, 3163.10, 3163.20, 12, 14);

        let state = MarketState::parse(&first).expect("decode");
        assert_eq!(state.exchange, "binance");
        assert_eq!(state.instrument, "ETHUSDT");
        assert_eq!(state.ts_ms, 1700000000123);
        assert_eq!(state.bid_levels, 12);
        assert_eq!(state.ask_levels, 14);

        let reenc = StateSnapshot {
            exchange: state.exchange.clone(),
            instrument: state.instrument.clone(),
            ts_ms: state.ts_ms,
            mid: state.mid,
            spread: state.spread,
            r1: state.r1,
            r5: state.r5,
            r10: state.r10,
            imbalance: 0.0,
            cross_ex_signal: 0.0,
            bid_vol: state.bid_vol,
            ask_vol: state.ask_vol,
        };
        let second = encode_market_state(
            &reenc,
            state.bid,
            state.ask,
            state.bid_levels,
            state.ask_levels,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn parse_accepts_numeric_strings() {
        let payload = r#"{
            "schema":"market_state_v1","exchange":"bybit","instrument":"ETHUSDT",
            "ts_ms":"1700000000000",
            "top_of_book":{"bid":"100.5","ask":"100.7","mid":"100.6","spread":"0.2"},
            "returns":{"r1":"0.001","r5":0.002,"r10":"0.003"},
            "depth":{"bid_vol":["1","2","3","0","0"],"ask_vol":[1,1,1,1,1]}
        }"#;
        let s = MarketState::parse(payload).expect("decode");
        assert_eq!(s.ts_ms, 1700000000000);
        assert_eq!(s.bid, 100.5);
        assert_eq!(s.r1, 0.001);
        assert_eq!(s.bid_vol[2], 3.0);
    }

    #[test]
    fn parse_rejects_missing_identity() {
        assert!(MarketState::parse(r#"{"schema":"market_state_v1"}"#).is_none());
        assert!(MarketState::parse("not json").is_none());
    }

    #[test]
    fn imbalance_derived_from_depth() {
        let payload = r#"{
            "schema":"market_state_v1","exchange":"binance","instrument":"BTCUSDT",
            "ts_ms":1,
            "depth":{"bid_vol":[3,0,0,0,0],"ask_vol":[1,0,0,0,0]}
        }"#;
        let s = MarketState::parse(payload).expect("decode");
        assert!((s.imbalance - 0.5).abs() < 1e-6);
    }
}
