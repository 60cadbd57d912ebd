use std::path::Path;

use anyhow::Result;

use super::ledger::{ExecutionRecord, FundingRecord, TradeEvent, read_jsonl};

/// Realized-PnL aggregate over the trades ledger.
#[derive(Debug, Clone, Default)]
pub struct RealizedSummary {
    pub gross_realized: f64,
    pub net_realized: f64,
    pub close_events: u64,
}

/// Execution-fee aggregate over the executions ledger.
#[derive(Debug, Clone, Default)]
pub struct FeeSummary {
    pub fees: f64,
    pub exec_count: u64,
}

/// Funding aggregate over the funding ledger.
#[derive(Debug, Clone, Default)]
pub struct FundingSummary {
    pub funding: f64,
    pub event_count: u64,
}

/// Window membership: half-open (start_ms, end_ms].
fn in_window(ts_ms: i64, start_ms: i64, end_ms: i64) -> bool {
    ts_ms > start_ms && ts_ms <= end_ms
}

/// Sum realized PnL for `symbol` over (start_ms, end_ms].
pub fn realized_in_window(
    trades_path: &Path,
    symbol: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<RealizedSummary> {
    let mut out = RealizedSummary::default();
    for ev in read_jsonl::<TradeEvent>(trades_path)? {
        if ev.symbol != symbol || !in_window(ev.ts_ms, start_ms, end_ms) {
            continue;
        }
        out.gross_realized += ev.gross_realized;
        out.net_realized += ev.net_realized;
        out.close_events += 1;
    }
    Ok(out)
}

/// Sum realized PnL for `symbol` over the whole ledger.
pub fn realized_all(trades_path: &Path, symbol: &str) -> Result<RealizedSummary> {
    let mut out = RealizedSummary::default();
    for ev in read_jsonl::<TradeEvent>(trades_path)? {
        if ev.symbol != symbol {
            continue;
        }
        out.gross_realized += ev.gross_realized;
        out.net_realized += ev.net_realized;
        out.close_events += 1;
    }
    Ok(out)
}

/// Sum execution fees for `symbol` over (start_ms, end_ms].
pub fn exec_fees_in_window(
    exec_path: &Path,
    symbol: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<FeeSummary> {
    let mut out = FeeSummary::default();
    for rec in read_jsonl::<ExecutionRecord>(exec_path)? {
        if rec.symbol != symbol || !in_window(rec.ts_ms, start_ms, end_ms) {
            continue;
        }
        out.fees += rec.exec_fee;
        out.exec_count += 1;
    }
    Ok(out)
}

/// Sum funding settlements for `symbol` over (start_ms, end_ms].
pub fn funding_in_window(
    funding_path: &Path,
    symbol: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<FundingSummary> {
    let mut out = FundingSummary::default();
    for rec in read_jsonl::<FundingRecord>(funding_path)? {
        if rec.symbol != symbol || !in_window(rec.ts_ms, start_ms, end_ms) {
            continue;
        }
        out.funding += rec.funding;
        out.event_count += 1;
    }
    Ok(out)
}
