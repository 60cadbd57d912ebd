// ------------------------------------------------------------
// Executions -> trades reconciliation and PnL report
// ------------------------------------------------------------
//
// Folds the executions ledger into the trades ledger (idempotent), then
// prints windowed and all-time realized PnL plus execution fees and
// funding for the window.
//
// Usage:
//   pnl-report [category] [symbol] [window_hours]
// Defaults: linear, ETHUSDT, 24
//
use std::path::Path;

use anyhow::Result;
use serde_json::json;

use market_state_collector::pnl::ledger::{
    EXECUTIONS_LEDGER_PATH, FUNDING_LEDGER_PATH, TRADES_LEDGER_PATH,
};
use market_state_collector::pnl::reconciler::FifoReconciler;
use market_state_collector::pnl::report::{
    exec_fees_in_window, funding_in_window, realized_all, realized_in_window,
};
use market_state_collector::util::now_ms;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let category = args.next().unwrap_or_else(|| "linear".to_string());
    let symbol = args.next().unwrap_or_else(|| "ETHUSDT".to_string());
    let window_hours: i64 = args
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(24);

    let exec_path = Path::new(EXECUTIONS_LEDGER_PATH);
    let funding_path = Path::new(FUNDING_LEDGER_PATH);
    let trades_path = Path::new(TRADES_LEDGER_PATH);

    let mut reconciler = FifoReconciler::new(&category, &symbol);
    let summary = reconciler.reconcile(exec_path, trades_path)?;
    println!(
        "{}",
        json!({
            "symbol": symbol,
            "new_close_events": summary.closed_events,
            "duplicates_skipped": summary.duplicates_skipped,
            "open_lots": reconciler.lots().len(),
        })
    );

    let end_ms = now_ms();
    let start_ms = end_ms - window_hours * 3_600_000;

    let window = realized_in_window(trades_path, &symbol, start_ms, end_ms)?;
    println!(
        "{}",
        json!({
            "symbol": symbol,
            "window_hours": window_hours,
            "gross_realized": window.gross_realized,
            "net_realized": window.net_realized,
            "close_events": window.close_events,
        })
    );

    let all = realized_all(trades_path, &symbol)?;
    println!(
        "{}",
        json!({
            "symbol": symbol,
            "gross_realized_all": all.gross_realized,
            "net_realized_all": all.net_realized,
            "close_events_all": all.close_events,
        })
    );

    let fees = exec_fees_in_window(exec_path, &symbol, start_ms, end_ms)?;
    let funding = funding_in_window(funding_path, &symbol, start_ms, end_ms)?;
    println!(
        "{}",
        json!({
            "symbol": symbol,
            "window_hours": window_hours,
            "exec_fees": fees.fees,
            "exec_count": fees.exec_count,
            "funding": funding.funding,
            "funding_events": funding.event_count,
        })
    );

    Ok(())
}
