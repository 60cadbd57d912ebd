use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::util::{json_f64, json_i64};

pub const EXECUTIONS_LEDGER_PATH: &str = "executions_ledger.jsonl";
pub const FUNDING_LEDGER_PATH: &str = "funding_ledger.jsonl";
pub const TRADES_LEDGER_PATH: &str = "trades_ledger.jsonl";

/// Exchanges emit numerics both as numbers and as strings; ledger decode
/// accepts either and defaults to zero.
fn flex_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(json_f64(&v).unwrap_or(0.0))
}

fn flex_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(json_i64(&v).unwrap_or(0))
}

/// One fill as appended by the order router. Only records with
/// `execType == "Trade"` participate in PnL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(default, deserialize_with = "flex_i64")]
    pub ts_ms: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "execId")]
    pub exec_id: String,
    #[serde(rename = "orderId", default)]
    pub order_id: String,
    /// "Buy" or "Sell" (any case accepted).
    #[serde(default)]
    pub side: String,
    #[serde(rename = "execPrice", default, deserialize_with = "flex_f64")]
    pub exec_price: f64,
    #[serde(rename = "execQty", default, deserialize_with = "flex_f64")]
    pub exec_qty: f64,
    #[serde(rename = "execFee", default, deserialize_with = "flex_f64")]
    pub exec_fee: f64,
    #[serde(rename = "execType", default)]
    pub exec_type: String,
}

impl ExecutionRecord {
    pub fn is_trade(&self) -> bool {
        self.exec_type == "Trade"
    }
}

/// One funding settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRecord {
    #[serde(default, deserialize_with = "flex_i64")]
    pub ts_ms: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "fundId")]
    pub fund_id: String,
    #[serde(default, deserialize_with = "flex_f64")]
    pub funding: f64,
    #[serde(default)]
    pub currency: String,
}

/// One closed round-trip produced by the FIFO reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub ts_ms: i64,
    pub category: String,
    pub symbol: String,

    #[serde(rename = "close_execId")]
    pub close_exec_id: String,
    #[serde(rename = "open_execId")]
    pub open_exec_id: String,
    /// "LONG" or "SHORT": the side of the inventory that was closed.
    pub side_closed: String,

    pub qty: f64,
    pub open_price: f64,
    pub close_price: f64,

    pub gross_realized: f64,
    pub fee_close_alloc: f64,
    pub fee_open_alloc: f64,
    pub net_realized: f64,

    #[serde(rename = "tradeId")]
    pub trade_id: String,
}

/// Dedupe key for a funding settlement: the native id when the exchange
/// supplies one, otherwise `ts|symbol|funding|currency`.
pub fn make_fund_id(entry: &Value, symbol: &str) -> String {
    for key in ["id", "transId", "txnId"] {
        if let Some(id) = entry.get(key).and_then(|v| v.as_str()) {
            return id.to_string();
        }
    }

    let ts = entry
        .get("execTime")
        .or_else(|| entry.get("transactionTime"))
        .and_then(json_i64)
        .map(|t| t.to_string())
        .unwrap_or_default();
    let funding = entry
        .get("funding")
        .and_then(json_f64)
        .map(|f| f.to_string())
        .unwrap_or_default();
    let currency = entry
        .get("currency")
        .or_else(|| entry.get("feeCurrency"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    format!("{}|{}|{}|{}", ts, symbol, funding, currency)
}

/// Read a JSON-lines ledger. A missing file is an empty ledger; malformed
/// lines are skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };

    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(rec) = serde_json::from_str::<T>(&line) {
            out.push(rec);
        }
    }
    Ok(out)
}

/// Append one record to a JSON-lines ledger, creating the file if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
