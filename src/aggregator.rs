use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::orderbook::{BookSide, OrderBook};
use crate::schema::{MarketKey, Quote, StateVector};

/// Price-history retention. Wider than the longest return horizon (10 s)
/// so the r10 lookup always has a margin of samples to land on.
const HISTORY_WINDOW_MS: i64 = 15_000;

/// Everything guarded by the aggregator mutex.
///
/// Writers are the feed tasks (one `on_quote` per decoded market frame);
/// the only reader is the snapshot loop, which copies and releases.
#[derive(Default)]
struct AggState {
    state: HashMap<MarketKey, StateVector>,
    history: HashMap<MarketKey, VecDeque<(i64, f64)>>,
    last_quote: HashMap<MarketKey, Quote>,
    last_book: HashMap<MarketKey, OrderBook>,
}

/// One key's worth of copied state, handed to the snapshot loop.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    pub key: MarketKey,
    pub state: StateVector,
    pub quote: Quote,
    pub book: OrderBook,
}

/// Fuses per-tick updates from N feed tasks into shared per-key state.
///
/// The aggregator never publishes nor persists; it only derives features
/// and caches the latest quote + a deep copy of the book so the snapshot
/// loop can emit consistent bundles without waiting for a feed message.
pub struct MarketAggregator {
    inner: Mutex<AggState>,
}

impl Default for MarketAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AggState::default()),
        }
    }

    /// Handle one quote from a feed. Short critical section, bounded work.
    pub fn on_quote(&self, q: &Quote, book: &OrderBook) {
        let key = MarketKey::new(&q.exchange, &q.instrument);

        let mut guard = self.inner.lock();
        let AggState {
            state,
            history,
            last_quote,
            last_book,
        } = &mut *guard;

        last_quote.insert(key.clone(), q.clone());
        last_book.insert(key.clone(), book.clone());

        let mid = 0.5 * (q.bid + q.ask);
        let spread = q.ask - q.bid;

        let st = state.entry(key.clone()).or_default();
        st.mid = mid;
        st.spread = spread;

        st.r1 = 0.0;
        st.r5 = 0.0;
        st.r10 = 0.0;

        // History and returns only once the mid is usable; a half-warm
        // feed (one side of the book still empty) must not poison the
        // return horizon with zeros.
        if mid.is_finite() && mid > 0.0 {
            let hist = history.entry(key).or_default();
            hist.push_back((q.ts_ms, mid));
            while hist
                .front()
                .is_some_and(|&(ts, _)| q.ts_ms - ts > HISTORY_WINDOW_MS)
            {
                hist.pop_front();
            }

            // Newest to oldest: the first sample at least h seconds old
            // supplies the h-horizon return. A legitimate zero return must
            // not read as "unset", so each horizon tracks found separately.
            let (mut found_r1, mut found_r5, mut found_r10) = (false, false, false);
            for &(ts, past_mid) in hist.iter().rev() {
                let dt = (q.ts_ms - ts) as f64 / 1000.0;
                if dt >= 1.0 && !found_r1 {
                    st.r1 = (mid / past_mid).ln();
                    found_r1 = true;
                }
                if dt >= 5.0 && !found_r5 {
                    st.r5 = (mid / past_mid).ln();
                    found_r5 = true;
                }
                if dt >= 10.0 && !found_r10 {
                    st.r10 = (mid / past_mid).ln();
                    found_r10 = true;
                }
                if found_r10 {
                    break;
                }
            }
        }

        st.bid_vol = [0.0; 5];
        for (i, (_, qty)) in book.top_n(BookSide::Bid, 5).into_iter().enumerate() {
            st.bid_vol[i] = qty;
        }
        st.ask_vol = [0.0; 5];
        for (i, (_, qty)) in book.top_n(BookSide::Ask, 5).into_iter().enumerate() {
            st.ask_vol[i] = qty;
        }

        st.cross_ex_signal = 0.0;
    }

    /// Copy every key that has both a cached quote and book. Called by the
    /// snapshot loop; the lock is held only for the copies.
    pub fn snapshot_view(&self) -> Vec<SnapshotView> {
        let guard = self.inner.lock();
        guard
            .state
            .iter()
            .filter_map(|(key, st)| {
                let quote = guard.last_quote.get(key)?;
                let book = guard.last_book.get(key)?;
                Some(SnapshotView {
                    key: key.clone(),
                    state: *st,
                    quote: quote.clone(),
                    book: book.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote_at(ts_ms: i64, mid: f64) -> Quote {
        Quote {
            exchange: "binance".into(),
            instrument: "ETHUSDT".into(),
            bid: mid,
            ask: mid,
            spot: mid,
            ts_ms,
        }
    }

    #[test]
    fn returns_over_three_horizons() {
        let agg = MarketAggregator::new();
        let ob = OrderBook::new();

        for (ts, mid) in [(0, 100.0), (1000, 101.0), (5000, 102.0), (10000, 103.0)] {
            agg.on_quote(&quote_at(ts, mid), &ob);
        }

        let views = agg.snapshot_view();
        assert_eq!(views.len(), 1);
        let st = views[0].state;
        assert!((st.r1 - (103.0f64 / 102.0).ln()).abs() < 1e-12);
        assert!((st.r5 - (103.0f64 / 101.0).ln()).abs() < 1e-12);
        assert!((st.r10 - (103.0f64 / 100.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn zero_return_from_newest_sample_is_kept() {
        let agg = MarketAggregator::new();
        let ob = OrderBook::new();

        // The newest sample old enough for the 1 s horizon yields exactly
        // zero; an older sample must not overwrite it.
        agg.on_quote(&quote_at(0, 105.0), &ob);
        agg.on_quote(&quote_at(1000, 100.0), &ob);
        agg.on_quote(&quote_at(2000, 100.0), &ob);

        let st = agg.snapshot_view()[0].state;
        assert_eq!(st.r1, 0.0);
    }

    #[test]
    fn returns_zero_without_old_enough_samples() {
        let agg = MarketAggregator::new();
        let ob = OrderBook::new();
        agg.on_quote(&quote_at(0, 100.0), &ob);
        agg.on_quote(&quote_at(500, 101.0), &ob);

        let st = agg.snapshot_view()[0].state;
        assert_eq!(st.r1, 0.0);
        assert_eq!(st.r5, 0.0);
        assert_eq!(st.r10, 0.0);
    }

    #[test]
    fn history_evicted_past_window() {
        let agg = MarketAggregator::new();
        let ob = OrderBook::new();
        agg.on_quote(&quote_at(0, 100.0), &ob);
        // 20 s later the first sample is older than the 15 s window, so no
        // sample satisfies the 10 s horizon anymore.
        agg.on_quote(&quote_at(20_000, 103.0), &ob);

        let st = agg.snapshot_view()[0].state;
        assert_eq!(st.r10, 0.0);
    }

    #[test]
    fn top5_padding_with_thin_book() {
        let agg = MarketAggregator::new();
        let mut ob = OrderBook::new();
        ob.apply_snapshot(&[(100.0, 1.5), (99.0, 2.5), (98.0, 3.5)], &[]);

        agg.on_quote(&quote_at(0, 100.0), &ob);

        let st = agg.snapshot_view()[0].state;
        assert_eq!(st.bid_vol, [1.5, 2.5, 3.5, 0.0, 0.0]);
        assert_eq!(st.ask_vol, [0.0; 5]);
    }

    #[test]
    fn snapshot_view_bundles_quote_and_book_copy() {
        let agg = MarketAggregator::new();
        let mut ob = OrderBook::new();
        ob.apply_snapshot(&[(100.0, 1.0)], &[(101.0, 2.0)]);
        let q = Quote {
            exchange: "bybit".into(),
            instrument: "BTCUSDT".into(),
            bid: 100.0,
            ask: 101.0,
            spot: 100.5,
            ts_ms: 7,
        };
        agg.on_quote(&q, &ob);

        // Mutating the feed's book afterwards must not affect the cache.
        ob.apply_snapshot(&[(1.0, 1.0)], &[]);

        let views = agg.snapshot_view();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].book.best_bid(), 100.0);
        assert_eq!(views[0].quote.ts_ms, 7);
        assert_eq!(views[0].state.spread, 1.0);
    }

    #[test]
    fn half_warm_quote_does_not_poison_history() {
        let agg = MarketAggregator::new();
        let ob = OrderBook::new();

        // ask side not yet warm: mid is 0, no history entry.
        let cold = Quote {
            exchange: "binance".into(),
            instrument: "ETHUSDT".into(),
            bid: 0.0,
            ask: 0.0,
            spot: 0.0,
            ts_ms: 0,
        };
        agg.on_quote(&cold, &ob);
        agg.on_quote(&quote_at(2000, 100.0), &ob);

        let st = agg.snapshot_view()[0].state;
        // Only one usable sample; nothing old enough for any horizon.
        assert_eq!(st.r1, 0.0);
    }
}
