//! Shared helper utilities.
//!
//! This module contains:
//! - Time helpers
//! - Tolerant numeric extraction from JSON values
//! - Endpoint string parsing
//!
//! IMPORTANT:
//! - No exchange-specific business logic should live here.
//! - This module must remain lightweight and deterministic.

use serde_json::Value;

/// Returns the current Unix timestamp in milliseconds.
///
/// This function is used across the pipeline for:
/// - Quote timestamps
/// - Snapshot sampling times
/// - Ledger entries and report windows
///
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Extract an `f64` from a JSON value that may be a number or a numeric
/// string.
///
/// DESIGN NOTES:
/// - Exchange payloads and ledger files mix both representations freely,
///   so every numeric read in the pipeline goes through this helper.
/// - Returns `None` for anything else, so callers can preserve their
///   previously cached value on a malformed field.
///
pub fn json_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Extract an `i64` timestamp from a JSON value that may be an integer, a
/// float, or a numeric string.
pub fn json_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Strip a `tcp://` scheme and normalize a wildcard host for binding.
///
/// EXAMPLES:
/// - "tcp://*:5555"         -> "0.0.0.0:5555"
/// - "tcp://127.0.0.1:5555" -> "127.0.0.1:5555"
/// - "127.0.0.1:5555"       -> unchanged
///
pub fn socket_addr_of(endpoint: &str) -> String {
    let hostport = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
    match hostport.strip_prefix("*:") {
        Some(port) => format!("0.0.0.0:{}", port),
        None => hostport.to_string(),
    }
}
