use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::{Duration, interval};

use crate::aggregator::MarketAggregator;
use crate::metrics::METRICS;
use crate::publisher::Publisher;
use crate::schema::{StateSnapshot, encode_market_state};
use crate::store::StateStore;
use crate::util::now_ms;

/// Samples the shared state on a fixed monotonic clock, independent of the
/// feed tick rate, and emits one StateSnapshot per key per tick.
///
/// Each tick copies the per-key maps under the aggregator lock, releases
/// it, then publishes `state.<exchange>.<instrument>` and enqueues the
/// record for the store. Records are stamped with the sampling wall-clock
/// time, not the source quote time. The interval ticks on absolute
/// deadlines, so the cadence does not drift with processing time.
pub async fn run_snapshot_loop(
    aggregator: Arc<MarketAggregator>,
    publisher: Arc<Publisher>,
    store: Arc<StateStore>,
    interval_ms: u64,
    running: Arc<AtomicBool>,
) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));

    loop {
        ticker.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let views = aggregator.snapshot_view();
        let sampled_at = now_ms();

        for view in views {
            let snap = StateSnapshot {
                exchange: view.key.exchange,
                instrument: view.key.instrument,
                ts_ms: sampled_at,
                mid: view.state.mid,
                spread: view.state.spread,
                r1: view.state.r1,
                r5: view.state.r5,
                r10: view.state.r10,
                imbalance: 0.0,
                cross_ex_signal: view.state.cross_ex_signal,
                bid_vol: view.state.bid_vol,
                ask_vol: view.state.ask_vol,
            };

            let topic = format!("state.{}.{}", snap.exchange, snap.instrument);
            let payload = encode_market_state(
                &snap,
                view.quote.bid,
                view.quote.ask,
                view.book.bid_levels(),
                view.book.ask_levels(),
            );

            publisher.publish(&topic, &payload);
            METRICS.snapshots_published.fetch_add(1, Ordering::Relaxed);

            store.push(snap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderBook;
    use crate::schema::Quote;
    use rusqlite::Connection;

    #[tokio::test(start_paused = true)]
    async fn cadence_holds_at_50ms() {
        let aggregator = Arc::new(MarketAggregator::new());
        let mut ob = OrderBook::new();
        ob.apply_snapshot(&[(100.0, 1.0)], &[(101.0, 1.0)]);
        aggregator.on_quote(
            &Quote {
                exchange: "binance".into(),
                instrument: "ETHUSDT".into(),
                bid: 100.0,
                ask: 101.0,
                spot: 100.5,
                ts_ms: 0,
            },
            &ob,
        );

        let publisher = Publisher::bind("tcp://127.0.0.1:0").await.expect("bind");
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("state.db");
        let store = Arc::new(StateStore::new(db_path.to_str().unwrap()));
        store.start().expect("start");

        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_snapshot_loop(
            aggregator,
            publisher,
            store.clone(),
            50,
            running.clone(),
        ));

        // One second of steady state: ticks at 0, 50, ..., 950.
        tokio::time::sleep(Duration::from_millis(999)).await;
        running.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.await.expect("join");
        store.stop();

        let conn = Connection::open(db_path.to_str().unwrap()).expect("reopen");
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM market_state", [], |r| r.get(0))
            .expect("count");
        assert!(
            (19..=21).contains(&rows),
            "expected 20 +/- 1 snapshots in one second, got {}",
            rows
        );
    }
}
