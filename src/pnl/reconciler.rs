use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use log::info;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::ledger::{ExecutionRecord, TradeEvent, append_jsonl, read_jsonl};

/// Lots whose remaining quantity falls below this are considered closed.
const QTY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotSide {
    Long,
    Short,
}

impl LotSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotSide::Long => "LONG",
            LotSide::Short => "SHORT",
        }
    }
}

/// An open FIFO inventory entry awaiting a closing fill.
///
/// `fee_rem` is the slice of the opening fill's fee still reserved for
/// allocation to future closes of this lot.
#[derive(Debug, Clone)]
pub struct Lot {
    pub side: LotSide,
    pub qty: f64,
    pub px: f64,
    pub exec_id: String,
    pub ts_ms: i64,
    pub fee_rem: f64,
}

/// Deterministic trade-event identity: SHA-256 over the joined identity
/// fields, quantities and prices rendered at 10 fractional digits.
pub fn make_trade_id(
    close_exec_id: &str,
    open_exec_id: &str,
    symbol: &str,
    qty: f64,
    open_px: f64,
    close_px: f64,
    ts_ms: i64,
) -> String {
    let identity = format!(
        "{}|{}|{}|{:.10}|{:.10}|{:.10}|{}",
        close_exec_id, open_exec_id, symbol, qty, open_px, close_px, ts_ms
    );
    hex::encode(Sha256::digest(identity.as_bytes()))
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    pub closed_events: u64,
    pub duplicates_skipped: u64,
    pub gross_realized: f64,
    pub net_realized: f64,
}

/// Folds an executions ledger into a trades ledger for one (category,
/// symbol).
///
/// Matching is strict FIFO against the opposite side. Re-running over the
/// same executions appends nothing: trade identities already present in
/// the trades ledger are skipped.
pub struct FifoReconciler {
    category: String,
    symbol: String,
    lots: Vec<Lot>,
    seen: HashSet<String>,
}

impl FifoReconciler {
    pub fn new(category: &str, symbol: &str) -> Self {
        Self {
            category: category.to_string(),
            symbol: symbol.to_string(),
            lots: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    /// Hydrate the known trade-id set from an existing trades ledger.
    pub fn load_seen(&mut self, trades_path: &Path) -> Result<()> {
        let rows: Vec<Value> = read_jsonl(trades_path)?;
        for row in rows {
            if let Some(tid) = row.get("tradeId").and_then(|v| v.as_str()) {
                self.seen.insert(tid.to_string());
            }
        }
        Ok(())
    }

    /// Apply one fill to the open-lot inventory.
    ///
    /// Returns the trade events the fill closed (with identities), in
    /// match order. Inventory always advances; deduplication against the
    /// ledger happens at append time in `reconcile`.
    pub fn process_fill(&mut self, fill: &ExecutionRecord) -> Vec<TradeEvent> {
        let px = fill.exec_price;
        let mut qty = fill.exec_qty;
        let fee_total = fill.exec_fee;

        if qty <= 0.0 || px <= 0.0 {
            return Vec::new();
        }

        let side = fill.side.to_lowercase();
        let (is_buy, against) = match side.as_str() {
            "buy" => (true, LotSide::Short),
            "sell" => (false, LotSide::Long),
            _ => return Vec::new(),
        };

        // Original fill quantity, kept for close-fee splitting.
        let fill_qty_total = qty;
        let mut events = Vec::new();

        let mut i = 0;
        while i < self.lots.len() && qty > 0.0 {
            if self.lots[i].side != against {
                i += 1;
                continue;
            }

            let close_qty = qty.min(self.lots[i].qty);
            if close_qty <= 0.0 {
                i += 1;
                continue;
            }

            let open_px = self.lots[i].px;
            let gross = match against {
                LotSide::Long => (px - open_px) * close_qty,
                LotSide::Short => (open_px - px) * close_qty,
            };

            let fee_close_alloc = if fee_total != 0.0 {
                fee_total * (close_qty / fill_qty_total)
            } else {
                0.0
            };
            let fee_open_alloc = if self.lots[i].fee_rem != 0.0 && self.lots[i].qty > 0.0 {
                self.lots[i].fee_rem * (close_qty / self.lots[i].qty)
            } else {
                0.0
            };
            let net = gross - fee_close_alloc - fee_open_alloc;

            events.push(TradeEvent {
                ts_ms: fill.ts_ms,
                category: self.category.clone(),
                symbol: self.symbol.clone(),
                close_exec_id: fill.exec_id.clone(),
                open_exec_id: self.lots[i].exec_id.clone(),
                side_closed: against.as_str().to_string(),
                qty: close_qty,
                open_price: open_px,
                close_price: px,
                gross_realized: gross,
                fee_close_alloc,
                fee_open_alloc,
                net_realized: net,
                trade_id: make_trade_id(
                    &fill.exec_id,
                    &self.lots[i].exec_id,
                    &self.symbol,
                    close_qty,
                    open_px,
                    px,
                    fill.ts_ms,
                ),
            });

            self.lots[i].fee_rem -= fee_open_alloc;
            self.lots[i].qty -= close_qty;
            qty -= close_qty;

            if self.lots[i].qty <= QTY_EPSILON {
                self.lots.remove(i);
            } else {
                i += 1;
            }
        }

        // Residual quantity opens a new lot carrying its share of the fee.
        if qty > QTY_EPSILON {
            self.lots.push(Lot {
                side: if is_buy { LotSide::Long } else { LotSide::Short },
                qty,
                px,
                exec_id: fill.exec_id.clone(),
                ts_ms: fill.ts_ms,
                fee_rem: if fee_total != 0.0 {
                    fee_total * (qty / fill_qty_total)
                } else {
                    0.0
                },
            });
        }

        events
    }

    /// Read the executions ledger, impose the total order, and fold every
    /// fill into the trades ledger.
    pub fn reconcile(&mut self, exec_path: &Path, trades_path: &Path) -> Result<ReconcileSummary> {
        self.load_seen(trades_path)?;

        let mut execs: Vec<ExecutionRecord> = read_jsonl(exec_path)?
            .into_iter()
            .filter(|e: &ExecutionRecord| {
                e.is_trade()
                    && e.category == self.category
                    && e.symbol == self.symbol
                    && !e.exec_id.is_empty()
            })
            .collect();
        execs.sort_by(|a, b| {
            a.ts_ms
                .cmp(&b.ts_ms)
                .then_with(|| a.exec_id.cmp(&b.exec_id))
        });

        let mut summary = ReconcileSummary::default();
        for fill in &execs {
            for event in self.process_fill(fill) {
                if self.seen.contains(&event.trade_id) {
                    summary.duplicates_skipped += 1;
                    continue;
                }
                append_jsonl(trades_path, &event)?;
                self.seen.insert(event.trade_id.clone());
                summary.closed_events += 1;
                summary.gross_realized += event.gross_realized;
                summary.net_realized += event.net_realized;
            }
        }

        info!(
            "reconciled {} fills for {} {}: {} closes, {} dups skipped",
            execs.len(),
            self.category,
            self.symbol,
            summary.closed_events,
            summary.duplicates_skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pnl::ledger::TRADES_LEDGER_PATH;

    fn fill(exec_id: &str, ts_ms: i64, side: &str, qty: f64, px: f64, fee: f64) -> ExecutionRecord {
        ExecutionRecord {
            ts_ms,
            category: "linear".into(),
            symbol: "ETHUSDT".into(),
            exec_id: exec_id.into(),
            order_id: format!("o-{}", exec_id),
            side: side.into(),
            exec_price: px,
            exec_qty: qty,
            exec_fee: fee,
            exec_type: "Trade".into(),
        }
    }

    fn write_execs(path: &Path, fills: &[ExecutionRecord]) {
        for f in fills {
            append_jsonl(path, f).expect("append exec");
        }
    }

    #[test]
    fn fifo_close_with_fee_allocation() {
        // Buy 1 @ 100 (fee 0.10), buy 1 @ 110 (fee 0.11), sell 1.5 @ 120
        // (fee 0.18).
        let dir = tempfile::tempdir().expect("tempdir");
        let exec_path = dir.path().join("executions.jsonl");
        let trades_path = dir.path().join(TRADES_LEDGER_PATH);
        write_execs(
            &exec_path,
            &[
                fill("e1", 1000, "Buy", 1.0, 100.0, 0.10),
                fill("e2", 2000, "Buy", 1.0, 110.0, 0.11),
                fill("e3", 3000, "Sell", 1.5, 120.0, 0.18),
            ],
        );

        let mut rec = FifoReconciler::new("linear", "ETHUSDT");
        let summary = rec.reconcile(&exec_path, &trades_path).expect("reconcile");
        assert_eq!(summary.closed_events, 2);

        let events: Vec<TradeEvent> = read_jsonl(&trades_path).expect("read trades");
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.qty, 1.0);
        assert_eq!(first.open_price, 100.0);
        assert_eq!(first.close_price, 120.0);
        assert!((first.gross_realized - 20.0).abs() < 1e-9);
        assert!((first.fee_close_alloc - 0.12).abs() < 1e-9);
        assert!((first.fee_open_alloc - 0.10).abs() < 1e-9);
        assert!((first.net_realized - 19.78).abs() < 1e-9);

        let second = &events[1];
        assert_eq!(second.qty, 0.5);
        assert_eq!(second.open_price, 110.0);
        assert!((second.gross_realized - 5.0).abs() < 1e-9);
        assert!((second.fee_close_alloc - 0.06).abs() < 1e-9);
        assert!((second.fee_open_alloc - 0.055).abs() < 1e-9);
        assert!((second.net_realized - 4.885).abs() < 1e-9);

        // Remaining inventory: half the second buy, with half its fee
        // still reserved.
        assert_eq!(rec.lots().len(), 1);
        let lot = &rec.lots()[0];
        assert_eq!(lot.side, LotSide::Long);
        assert!((lot.qty - 0.5).abs() < 1e-12);
        assert_eq!(lot.px, 110.0);
        assert!((lot.fee_rem - 0.055).abs() < 1e-9);
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec_path = dir.path().join("executions.jsonl");
        let trades_path = dir.path().join(TRADES_LEDGER_PATH);
        write_execs(
            &exec_path,
            &[
                fill("e1", 1000, "Buy", 1.0, 100.0, 0.10),
                fill("e2", 2000, "Buy", 1.0, 110.0, 0.11),
                fill("e3", 3000, "Sell", 1.5, 120.0, 0.18),
            ],
        );

        let mut first = FifoReconciler::new("linear", "ETHUSDT");
        first.reconcile(&exec_path, &trades_path).expect("first run");

        let mut second = FifoReconciler::new("linear", "ETHUSDT");
        let summary = second
            .reconcile(&exec_path, &trades_path)
            .expect("second run");
        assert_eq!(summary.closed_events, 0);
        assert_eq!(summary.duplicates_skipped, 2);

        let events: Vec<TradeEvent> = read_jsonl(&trades_path).expect("read trades");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn gross_sum_invariant_under_batching() {
        let fills = [
            fill("e1", 1000, "Buy", 2.0, 100.0, 0.2),
            fill("e2", 2000, "Sell", 0.5, 105.0, 0.05),
            fill("e3", 3000, "Sell", 2.5, 110.0, 0.25),
            fill("e4", 4000, "Buy", 1.0, 108.0, 0.1),
        ];

        let gross_of = |batches: &[&[ExecutionRecord]]| -> f64 {
            let mut rec = FifoReconciler::new("linear", "ETHUSDT");
            let mut gross = 0.0;
            for batch in batches {
                for f in *batch {
                    for ev in rec.process_fill(f) {
                        gross += ev.gross_realized;
                    }
                }
            }
            gross
        };

        let one_shot = gross_of(&[&fills]);
        let split = gross_of(&[&fills[..1], &fills[1..3], &fills[3..]]);
        assert!((one_shot - split).abs() < 1e-9);
    }

    #[test]
    fn fee_conservation_on_full_round_trip() {
        let mut rec = FifoReconciler::new("linear", "ETHUSDT");
        rec.process_fill(&fill("open", 1, "Buy", 2.0, 100.0, 0.34));
        let events = rec.process_fill(&fill("close", 2, "Sell", 2.0, 101.0, 0.56));

        let open_alloc: f64 = events.iter().map(|e| e.fee_open_alloc).sum();
        let close_alloc: f64 = events.iter().map(|e| e.fee_close_alloc).sum();
        assert!((open_alloc - 0.34).abs() < 1e-9);
        assert!((close_alloc - 0.56).abs() < 1e-9);
        assert!(rec.lots().is_empty());
    }

    #[test]
    fn buy_closes_shorts_first() {
        let mut rec = FifoReconciler::new("linear", "ETHUSDT");
        rec.process_fill(&fill("s1", 1, "Sell", 1.0, 100.0, 0.0));
        let events = rec.process_fill(&fill("b1", 2, "Buy", 1.0, 90.0, 0.0));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].side_closed, "SHORT");
        assert!((events[0].gross_realized - 10.0).abs() < 1e-9);
        assert!(rec.lots().is_empty());
    }

    #[test]
    fn non_trade_and_foreign_records_excluded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec_path = dir.path().join("executions.jsonl");
        let trades_path = dir.path().join(TRADES_LEDGER_PATH);

        let mut funding = fill("f1", 1, "Buy", 1.0, 100.0, 0.0);
        funding.exec_type = "Funding".into();
        let mut other_symbol = fill("x1", 2, "Buy", 1.0, 100.0, 0.0);
        other_symbol.symbol = "BTCUSDT".into();
        write_execs(
            &exec_path,
            &[funding, other_symbol, fill("e1", 3, "Sell", 1.0, 100.0, 0.0)],
        );

        let mut rec = FifoReconciler::new("linear", "ETHUSDT");
        let summary = rec.reconcile(&exec_path, &trades_path).expect("reconcile");
        // Nothing to close: the only eligible fill opens a short.
        assert_eq!(summary.closed_events, 0);
        assert_eq!(rec.lots().len(), 1);
        assert_eq!(rec.lots()[0].side, LotSide::Short);
    }

    #[test]
    fn total_order_imposed_on_unsorted_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let exec_path = dir.path().join("executions.jsonl");
        let trades_path = dir.path().join(TRADES_LEDGER_PATH);
        // Close written before open; ordering by (ts_ms, execId) repairs it.
        write_execs(
            &exec_path,
            &[
                fill("e2", 2000, "Sell", 1.0, 110.0, 0.0),
                fill("e1", 1000, "Buy", 1.0, 100.0, 0.0),
            ],
        );

        let mut rec = FifoReconciler::new("linear", "ETHUSDT");
        let summary = rec.reconcile(&exec_path, &trades_path).expect("reconcile");
        assert_eq!(summary.closed_events, 1);
        assert!((summary.gross_realized - 10.0).abs() < 1e-9);
    }

    #[test]
    fn trade_id_is_pure_and_distinct() {
        let a = make_trade_id("c", "o", "ETHUSDT", 1.0, 100.0, 110.0, 5);
        let b = make_trade_id("c", "o", "ETHUSDT", 1.0, 100.0, 110.0, 5);
        let c = make_trade_id("c", "o", "ETHUSDT", 1.0, 100.0, 110.0, 6);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
